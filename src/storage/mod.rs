//! Storage backends for the monitoring engine
//!
//! This module provides a trait-based abstraction over everything the engine
//! persists: servers, metric samples, alert rules and history, and service
//! health status.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async so scheduled jobs never block the runtime
//! - **Atomic units**: each trait method commits completely or not at all
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, good for <100 servers
//! - **In-Memory** (fallback): No persistence, for testing
//!
//! ## Usage
//!
//! ```no_run
//! use system_monitor::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./monitor.db").await?;
//!     let local = backend.local_server().await?;
//!     println!("{local:?}");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, QueryRange, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{
    AlertDelivery, AlertHistory, AlertRule, NetworkMetric, NewAlertHistory, NewAlertRule, NewServer,
    NewService, ProcessSnapshot, Server, ServiceHealth, ServiceStatusUpdate, SweepReport,
    SystemMetric, User,
};
