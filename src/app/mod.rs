//! Command-line wiring for the `rask-log-manager` binary.

pub mod cli;
pub mod shutdown;
pub mod tracing;

use clap::Parser;

pub use cli::Cli;

pub async fn main() -> anyhow::Result<()> {
    self::tracing::init_tracing();
    let cli = Cli::parse();
    cli::run(cli).await
}
