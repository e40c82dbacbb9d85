//! Pause worker "W0", wait five seconds, then resume it.
//!
//! Run with:
//!   UNMANIC_HOST=192.168.1.99 cargo run --example pause_resume

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use unmanic::ClientBuilder;

#[tokio::main]
async fn main() -> unmanic::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = ClientBuilder::from_env().build()?;

    println!("Paused: {}", client.pause_worker("W0").await?);
    tokio::time::sleep(Duration::from_secs(5)).await;
    println!("Resumed: {}", client.resume_worker("W0").await?);

    client.close_session().await;
    Ok(())
}
