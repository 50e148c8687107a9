//! One-record-per-line text encoding used by the file backend:
//!
//! ```text
//! [2025-01-10T12:00:00Z] INFO : service started
//! ```
//!
//! Messages are written verbatim. An embedded newline splits the record and
//! the continuation is skipped on read as malformed.

use crate::domain::{LogEntry, LogLevel};
use chrono::{DateTime, SecondsFormat, Utc};

/// Width the level column is left-padded to.
pub const LEVEL_WIDTH: usize = 5;

pub fn encode_line(entry: &LogEntry) -> String {
    format!(
        "[{}] {:<width$}: {}\n",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        entry.level,
        entry.message,
        width = LEVEL_WIDTH,
    )
}

/// Parse one line; `None` for anything not shaped like an encoded record.
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let rest = line.strip_prefix('[')?;
    let (raw_ts, rest) = rest.split_once(']')?;
    let timestamp = DateTime::parse_from_rfc3339(raw_ts)
        .ok()?
        .with_timezone(&Utc);

    let (raw_level, message) = rest.split_once(':')?;
    let level = raw_level.trim().parse::<LogLevel>().ok()?;
    let message = message.strip_prefix(' ').unwrap_or(message);

    Some(LogEntry::new(level, message, timestamp))
}
