//! Row definitions for everything the monitoring engine persists
//!
//! ## Ownership
//!
//! - `SystemMetric`, `NetworkMetric` and `ProcessSnapshot` are written only by
//!   the collector and never mutated afterwards
//! - `AlertRule` and `User` are owned by the presentation layer; the engine
//!   only reads them
//! - `AlertHistory` rows are created by the alert evaluator and only touched
//!   again by acknowledgement
//! - `ServiceHealth` is a rolling status that the health checker overwrites
//!
//! Timestamps are always UTC. Byte counters are cumulative totals as reported
//! by the operating system, not deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,

    /// Network address used by the remote-agent protocol (`host[:port]`)
    pub hostname: String,

    /// Key sent as `X-API-Key` when fetching from a remote agent
    pub api_key: String,

    /// Exactly one server per deployment is the local one
    pub is_local: bool,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a server
#[derive(Debug, Clone)]
pub struct NewServer {
    pub name: String,
    pub hostname: String,
    pub api_key: String,
    pub is_local: bool,
    pub is_active: bool,
}

/// Point-in-time host sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetric {
    pub server_id: i64,
    pub timestamp: DateTime<Utc>,

    /// Overall CPU utilisation (percentage 0-100)
    pub cpu_percent: f64,

    /// Current CPU frequency (MHz)
    pub cpu_freq: Option<f64>,

    /// CPU temperature (Celsius), absent when no known sensor exists
    pub cpu_temp_c: Option<f64>,

    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_percent: f64,

    /// Usage of the primary partition
    pub disk_total: Option<u64>,
    pub disk_used: Option<u64>,
    pub disk_percent: Option<f64>,

    pub io_read_bytes: Option<u64>,
    pub io_write_bytes: Option<u64>,
    pub io_read_count: Option<u64>,
    pub io_write_count: Option<u64>,
}

/// Point-in-time network sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetric {
    pub server_id: i64,
    pub timestamp: DateTime<Utc>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: Option<u64>,
    pub packets_recv: Option<u64>,
    pub connections_established: Option<u32>,
    pub connections_listen: Option<u32>,
    pub connections_time_wait: Option<u32>,
}

/// One process as seen during a collection tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub server_id: i64,
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub name: String,
    pub username: Option<String>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub status: Option<String>,
}

/// Account owning alert rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// A user-owned threshold specification
///
/// `metric_type` and `comparison` are kept as the raw strings the rule
/// management layer stored; the evaluator maps them onto closed enums and
/// treats anything it does not recognise as "never fires".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub user_id: i64,

    /// `None` means every active server
    pub server_id: Option<i64>,

    pub name: String,
    pub metric_type: String,
    pub comparison: String,
    pub threshold: f64,

    /// Minimum number of seconds between two alerts for the same server
    pub duration: u32,

    pub notify_email: bool,
    pub notify_sms: bool,
    pub notify_slack: bool,

    /// Overrides the owner's address for email notifications
    pub email_address: Option<String>,
    pub phone_number: Option<String>,

    pub is_active: bool,

    /// Email of the owning user, resolved by the store
    pub owner_email: Option<String>,
}

/// Insert payload for an alert rule
#[derive(Debug, Clone)]
pub struct NewAlertRule {
    pub user_id: i64,
    pub server_id: Option<i64>,
    pub name: String,
    pub metric_type: String,
    pub comparison: String,
    pub threshold: f64,
    pub duration: u32,
    pub notify_email: bool,
    pub notify_sms: bool,
    pub notify_slack: bool,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: bool,
}

impl NewAlertRule {
    /// Rule with the stock defaults: 60s window, email only, active
    pub fn new(
        user_id: i64,
        name: impl Into<String>,
        metric_type: impl Into<String>,
        comparison: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            user_id,
            server_id: None,
            name: name.into(),
            metric_type: metric_type.into(),
            comparison: comparison.into(),
            threshold,
            duration: 60,
            notify_email: true,
            notify_sms: false,
            notify_slack: false,
            email_address: None,
            phone_number: None,
            is_active: true,
        }
    }
}

/// A triggered alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistory {
    pub id: i64,
    pub rule_id: i64,
    pub server_id: i64,
    pub triggered_at: DateTime<Utc>,
    pub metric_value: f64,
    pub message: String,
    pub email_sent: bool,
    pub sms_sent: bool,
    pub slack_sent: bool,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Insert payload for an alert history record
#[derive(Debug, Clone)]
pub struct NewAlertHistory {
    pub rule_id: i64,
    pub server_id: i64,
    pub triggered_at: DateTime<Utc>,
    pub metric_value: f64,
    pub message: String,
    pub email_sent: bool,
    pub sms_sent: bool,
    pub slack_sent: bool,
}

/// Channels that delivered an alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertDelivery {
    pub email_sent: bool,
    pub sms_sent: bool,
    pub slack_sent: bool,
}

/// A monitored external endpoint together with its latest check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub description: Option<String>,

    /// Seconds between two checks
    pub check_interval: u32,

    /// Per-request timeout in seconds
    pub timeout: u32,

    pub is_active: bool,
    pub last_check_time: Option<DateTime<Utc>>,
    pub status_code: Option<u16>,

    /// Milliseconds
    pub response_time: Option<f64>,
    pub is_up: bool,
    pub error_message: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a monitored service
#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub check_interval: u32,
    pub timeout: u32,
    pub is_active: bool,
}

impl NewService {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: None,
            check_interval: 60,
            timeout: 5,
            is_active: true,
        }
    }
}

/// Result of one health probe, written over the service's previous status
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatusUpdate {
    pub is_up: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub error_message: Option<String>,
}

/// Number of rows removed by one retention sweep, per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub system_metrics: u64,
    pub network_metrics: u64,
    pub process_snapshots: u64,
    pub alert_history: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.system_metrics + self.network_metrics + self.process_snapshots + self.alert_history
    }
}
