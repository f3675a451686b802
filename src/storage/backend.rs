//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait: the persistence interface
//! every component of the engine talks to. Implementations must treat each
//! method as one unit of work: it either commits completely or leaves the
//! store untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    AlertDelivery, AlertHistory, AlertRule, NetworkMetric, NewAlertHistory, NewAlertRule, NewServer,
    NewService, ProcessSnapshot, Server, ServiceHealth, ServiceStatusUpdate, SweepReport,
    SystemMetric, User,
};

/// Query parameters for fetching metrics within a time range
#[derive(Debug, Clone)]
pub struct QueryRange {
    /// Server to query
    pub server_id: i64,

    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of results to return (for pagination)
    pub limit: Option<usize>,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by all
/// scheduled jobs through an `Arc`.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Implementations convert their own
/// errors to `StorageError` variants.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Servers
    // ========================================================================

    /// The server flagged as local, if it has been bootstrapped yet
    async fn local_server(&self) -> StorageResult<Option<Server>>;

    async fn server(&self, id: i64) -> StorageResult<Option<Server>>;

    async fn active_servers(&self) -> StorageResult<Vec<Server>>;

    async fn insert_server(&self, server: NewServer) -> StorageResult<Server>;

    /// Update `last_seen` of a server
    async fn touch_server(&self, id: i64, seen_at: DateTime<Utc>) -> StorageResult<()>;

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Insert a system metric and bump the server's `last_seen` to the
    /// metric timestamp, in one transaction
    async fn record_system_metric(&self, metric: SystemMetric) -> StorageResult<()>;

    async fn insert_network_metric(&self, metric: NetworkMetric) -> StorageResult<()>;

    /// Insert all snapshots of one tick atomically
    async fn insert_process_snapshots(&self, snapshots: Vec<ProcessSnapshot>)
    -> StorageResult<()>;

    async fn latest_system_metric(&self, server_id: i64) -> StorageResult<Option<SystemMetric>>;

    async fn latest_network_metric(&self, server_id: i64)
    -> StorageResult<Option<NetworkMetric>>;

    /// System metrics in a time range, oldest first
    async fn query_system_metrics(&self, query: QueryRange) -> StorageResult<Vec<SystemMetric>>;

    /// Network metrics in a time range, oldest first
    async fn query_network_metrics(&self, query: QueryRange)
    -> StorageResult<Vec<NetworkMetric>>;

    /// Process snapshots in a time range, oldest first
    async fn query_process_snapshots(
        &self,
        query: QueryRange,
    ) -> StorageResult<Vec<ProcessSnapshot>>;

    // ========================================================================
    // Users and alert rules
    // ========================================================================

    async fn insert_user(&self, username: &str, email: &str) -> StorageResult<User>;

    async fn insert_rule(&self, rule: NewAlertRule) -> StorageResult<AlertRule>;

    async fn rule(&self, id: i64) -> StorageResult<Option<AlertRule>>;

    async fn active_rules(&self) -> StorageResult<Vec<AlertRule>>;

    // ========================================================================
    // Alert history
    // ========================================================================

    /// Whether an alert for (rule, server) was triggered at or after `since`
    async fn has_alert_since(
        &self,
        rule_id: i64,
        server_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Insert an alert unless another one for the same (rule, server) was
    /// triggered at or after `quiet_since`
    ///
    /// The check and the insert happen atomically, so two concurrent callers
    /// can never both succeed for the same window. Returns `None` when the
    /// insert was suppressed.
    async fn insert_alert_if_quiet(
        &self,
        alert: NewAlertHistory,
        quiet_since: DateTime<Utc>,
    ) -> StorageResult<Option<AlertHistory>>;

    /// Store the delivery flags of an alert; returns `false` for unknown ids
    async fn record_alert_delivery(
        &self,
        id: i64,
        delivery: AlertDelivery,
    ) -> StorageResult<bool>;

    /// Alert history of a rule, newest first
    async fn alerts_for_rule(&self, rule_id: i64) -> StorageResult<Vec<AlertHistory>>;

    /// Mark an alert as acknowledged; returns `false` for unknown ids
    async fn acknowledge_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<bool>;

    // ========================================================================
    // Service health
    // ========================================================================

    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceHealth>;

    async fn service(&self, id: i64) -> StorageResult<Option<ServiceHealth>>;

    async fn active_services(&self) -> StorageResult<Vec<ServiceHealth>>;

    /// Overwrite the rolling status of a service
    async fn update_service_status(
        &self,
        id: i64,
        update: ServiceStatusUpdate,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete metric rows older than `metrics_before` and alert history older
    /// than `alerts_before`, all in one transaction
    async fn purge_older_than(
        &self,
        metrics_before: DateTime<Utc>,
        alerts_before: DateTime<Utc>,
    ) -> StorageResult<SweepReport>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend is operational.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
