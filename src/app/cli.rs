use super::shutdown::shutdown_signal;
use crate::adapter::file::line_format::encode_line;
use crate::config::{BackendConfig, BackendKind, FileSettings, ManagerConfig, SqlSettings};
use crate::domain::{LogEntry, LogFilter, LogLevel};
use crate::error::LogError;
use crate::manager::LogManager;
use crate::port::LogObserver;
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Write, query and load-test a log store.
///
/// Settings come from `--config` when given, otherwise from `RASK_LOG_*`
/// environment variables; the backend flags below override either.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "RASK_LOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend kind (file or sql)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Log file path for the file backend
    #[arg(long)]
    pub file_path: Option<PathBuf>,

    /// Connection string for the sql backend
    #[arg(long)]
    pub sql_dsn: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write one entry synchronously
    Write {
        #[arg(long, default_value = "info")]
        level: LogLevel,
        message: String,
    },
    /// Print stored entries in the on-disk line format
    Read {
        #[arg(long)]
        level: Option<LogLevel>,
        /// Keep entries whose message contains this text
        #[arg(long)]
        contains: Option<String>,
        /// Inclusive lower bound (RFC 3339)
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Inclusive upper bound (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Remove entries stamped at or before a point in time
    Clear {
        #[arg(long)]
        before: DateTime<Utc>,
    },
    /// Run concurrent producers through the asynchronous pipeline
    Burst {
        #[arg(long, default_value = "10")]
        producers: usize,
        #[arg(long, default_value = "100")]
        per_producer: usize,
        #[arg(long)]
        queue_capacity: Option<usize>,
        #[arg(long)]
        submit_timeout_ms: Option<u64>,
    },
}

impl Cli {
    /// Load the base configuration and apply the backend flags.
    pub fn resolve_config(&self) -> Result<ManagerConfig, LogError> {
        let mut config = match &self.config {
            Some(path) => ManagerConfig::load_toml(path)?,
            None => ManagerConfig::from_env()?,
        };

        let kind = self.backend.unwrap_or_else(|| config.backend.kind());
        config.backend = match (kind, config.backend) {
            (BackendKind::File, BackendConfig::File(mut settings)) => {
                if let Some(path) = &self.file_path {
                    settings.path = path.clone();
                }
                BackendConfig::File(settings)
            }
            (BackendKind::File, BackendConfig::Sql(_)) => BackendConfig::File(
                self.file_path
                    .clone()
                    .map(FileSettings::at)
                    .unwrap_or_default(),
            ),
            (BackendKind::Sql, BackendConfig::Sql(mut settings)) => {
                if let Some(dsn) = &self.sql_dsn {
                    settings.dsn = dsn.clone();
                }
                BackendConfig::Sql(settings)
            }
            (BackendKind::Sql, BackendConfig::File(_)) => {
                let dsn = self.sql_dsn.clone().ok_or_else(|| {
                    LogError::InvalidSettings("--sql-dsn is required for the sql backend".into())
                })?;
                BackendConfig::Sql(SqlSettings::with_dsn(dsn))
            }
        };

        config.validate()?;
        Ok(config)
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = cli.resolve_config().context("invalid configuration")?;

    match cli.command {
        Command::Write { level, message } => {
            config.async_delivery = false;
            let manager = LogManager::create(config).await?;
            let written = manager.write_log(level, message).await;
            manager.close().await?;
            written?;
        }
        Command::Read {
            level,
            contains,
            since,
            until,
        } => {
            config.async_delivery = false;
            let filter = build_filter(contains, since, until);
            let manager = LogManager::create(config).await?;
            let entries = manager.read_logs(level, &filter).await;
            manager.close().await?;
            for entry in entries? {
                print!("{}", encode_line(&entry));
            }
        }
        Command::Clear { before } => {
            config.async_delivery = false;
            let manager = LogManager::create(config).await?;
            let cleared = manager.clear_logs(before).await;
            manager.close().await?;
            cleared?;
            info!(before = %before.to_rfc3339(), "Cleared log entries");
        }
        Command::Burst {
            producers,
            per_producer,
            queue_capacity,
            submit_timeout_ms,
        } => {
            config.async_delivery = true;
            if let Some(capacity) = queue_capacity {
                config.queue_capacity = capacity;
            }
            if let Some(ms) = submit_timeout_ms {
                config.submit_timeout = Duration::from_millis(ms);
            }
            run_burst(config, producers, per_producer).await?;
        }
    }
    Ok(())
}

fn build_filter(
    contains: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> LogFilter {
    let mut filter = LogFilter::new();
    if let Some(start) = since {
        filter = filter.since(start);
    }
    if let Some(end) = until {
        filter = filter.until(end);
    }
    if let Some(needle) = contains {
        filter = filter.containing(needle);
    }
    filter
}

/// Prints every `ERROR` entry it is handed.
struct AlertObserver;

impl LogObserver for AlertObserver {
    fn handle<'a>(
        &'a self,
        entry: &'a LogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), LogError>> + Send + 'a>> {
        Box::pin(async move {
            if entry.level == LogLevel::Error {
                println!("ALERT: {}", entry.message);
            }
            Ok(())
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BurstTally {
    accepted: u64,
    saturated: u64,
}

async fn produce(
    manager: Arc<LogManager>,
    producer: usize,
    count: usize,
    stop: CancellationToken,
) -> BurstTally {
    let mut tally = BurstTally::default();
    for i in 0..count {
        if stop.is_cancelled() {
            break;
        }
        let level = if i % 50 == 49 {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        match manager
            .write_log(level, format!("producer {producer} entry {i}"))
            .await
        {
            Ok(()) => tally.accepted += 1,
            Err(e) if e.is_retryable() => tally.saturated += 1,
            Err(e) => {
                warn!(producer, error = %e, "Producer stopped");
                break;
            }
        }
    }
    tally
}

async fn run_burst(config: ManagerConfig, producers: usize, per_producer: usize) -> anyhow::Result<()> {
    let manager = Arc::new(LogManager::create(config).await?);
    manager.register_observer(Arc::new(AlertObserver));

    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        signal_stop.cancel();
    });

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for producer in 0..producers {
        tasks.spawn(produce(manager.clone(), producer, per_producer, stop.clone()));
    }

    let mut total = BurstTally::default();
    while let Some(joined) = tasks.join_next().await {
        let tally = joined.context("producer task failed")?;
        total.accepted += tally.accepted;
        total.saturated += tally.saturated;
    }
    watcher.abort();

    manager.close().await?;
    let elapsed = started.elapsed();
    let stats = manager.stats();

    println!(
        "accepted={} saturated={} delivered={} write_failures={} elapsed_ms={}",
        total.accepted,
        total.saturated,
        stats.delivered,
        stats.write_failures,
        elapsed.as_millis()
    );
    if stop.is_cancelled() {
        println!("interrupted, queued entries were drained before exit");
    }
    Ok(())
}
