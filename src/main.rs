#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_sync_lib::run().await?;
    Ok(())
}
