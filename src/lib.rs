//! # Unmanic client for Rust
//!
//! Async client for the REST API of an [Unmanic](https://docs.unmanic.app)
//! installation. Read and write settings, inspect and control workers, page
//! through the pending queue and the task history -- all as typed values.
//!
//! ## Quick start
//!
//! ```no_run
//! use unmanic::Client;
//!
//! #[tokio::main]
//! async fn main() -> unmanic::Result<()> {
//!     let client = Client::new("localhost")?;
//!
//!     println!("Version: {}", client.get_version().await?);
//!     println!("Name: {}", client.get_installation_name().await?);
//!
//!     let queue = client.get_pending_tasks(None).await?;
//!     println!("{} files pending", queue.records_total);
//!     for task in &queue.results {
//!         println!("  [{}] {}", task.priority, task.abspath);
//!     }
//!
//!     client.close_session().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Builder pattern
//!
//! ```no_run
//! use unmanic::ClientBuilder;
//! use std::time::Duration;
//!
//! # fn example() -> unmanic::Result<()> {
//! let client = ClientBuilder::new()
//!     .host("unmanic.example.com")
//!     .port(443)
//!     .tls(true)
//!     .request_timeout(Duration::from_secs(15))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Client methods return [`UnmanicError::Operation`], which names the failing
//! method and wraps the underlying error. Use
//! [`root_cause`](UnmanicError::root_cause) to match on the status-derived,
//! connection or decode variant.

mod client;
mod errors;
mod models;
mod transport;

pub use client::{Client, ClientBuilder};
pub use errors::{ApiErrorBody, ConnectionError, DecodeError, Operation, Result, UnmanicError};
pub use models::{
    Application, CompletedTask, OrderDirection, PendingTask, Settings, SettingsUpdate,
    SystemConfiguration, TaskHistory, TaskQuery, TaskQueue, Worker,
};
pub use transport::{ApiRequest, ConnectionConfig, HttpTransport, Method, Payload, Transport};
