use rask_log_manager::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
