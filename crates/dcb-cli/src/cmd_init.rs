use dcb_engine::Engine;

pub async fn execute(engine: &Engine) -> anyhow::Result<()> {
    let store_dir = engine.config().store_dir();
    tokio::fs::create_dir_all(&store_dir).await?;
    tokio::fs::create_dir_all(store_dir.join("events")).await?;
    println!("Initialized store at {}", store_dir.display());
    Ok(())
}
