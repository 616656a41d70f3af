use frakt_log_shipper::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
