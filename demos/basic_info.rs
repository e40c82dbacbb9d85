//! Connect to an Unmanic installation and print its version and name.
//!
//! Run with:
//!   UNMANIC_HOST=192.168.1.99 cargo run --example basic_info
//!
//! Set `RUST_LOG=unmanic=debug` to see each request.

use tracing_subscriber::EnvFilter;
use unmanic::ClientBuilder;

#[tokio::main]
async fn main() -> unmanic::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = ClientBuilder::from_env().build()?;

    let version = client.get_version().await?;
    println!("Version: {version}");

    let name = client.get_installation_name().await?;
    println!("Name: {name}");

    let config = client.get_system_configuration().await?;
    println!(
        "Host: {} ({} cores, {}), Python {}",
        config.cpu_brand, config.count, config.arch, config.python_version
    );

    client.close_session().await;
    Ok(())
}
