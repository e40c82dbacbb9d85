//! Refresh the cached application snapshot, then read from it.
//!
//! Run with:
//!   UNMANIC_HOST=192.168.1.99 cargo run --example application_cache

use tracing_subscriber::EnvFilter;
use unmanic::ClientBuilder;

#[tokio::main]
async fn main() -> unmanic::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut client = ClientBuilder::from_env().build()?;
    client.update(false).await?;

    if let Some(app) = client.app() {
        println!("Unmanic {} ({})", app.version, app.settings.installation_name);
        for worker in &app.workers {
            let state = match (worker.idle, worker.paused) {
                (_, true) => "paused",
                (true, false) => "idle",
                (false, false) => "busy",
            };
            println!("  {} [{state}] {}", worker.name, worker.current_file);
        }
    }

    let history = client.get_task_history(None).await?;
    println!("Last {} of {} completed tasks:", history.results.len(), history.records_total);
    for task in &history.results {
        let outcome = if task.success { "ok" } else { "failed" };
        println!("  {} {} ({outcome})", task.finish_time, task.label);
    }

    client.close_session().await;
    Ok(())
}
