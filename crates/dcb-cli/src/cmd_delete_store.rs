use dcb_engine::Engine;
use tokio_util::sync::CancellationToken;

pub async fn execute(engine: &Engine, cancel: &CancellationToken) -> anyhow::Result<()> {
    engine.delete_store(cancel).await?;
    println!("Deleted store at {}", engine.config().store_dir().display());
    Ok(())
}
