//! Increase the worker count by one.
//!
//! Run with:
//!   UNMANIC_HOST=192.168.1.99 cargo run --example scaling_workers

use tracing_subscriber::EnvFilter;
use unmanic::ClientBuilder;

#[tokio::main]
async fn main() -> unmanic::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = ClientBuilder::from_env().build()?;

    let count = client.get_workers_count().await?;
    println!("Workers count: {count}");

    println!("Updated: {}", client.set_workers_count(count + 1).await?);

    let count = client.get_workers_count().await?;
    println!("New workers count: {count}");

    client.close_session().await;
    Ok(())
}
