//! In-memory storage backend (no persistence)
//!
//! This backend keeps every table in memory behind a single `RwLock`.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the engine with `storage.backend = "none"`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: Metric tables are ring buffers per server

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, QueryRange, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AlertDelivery, AlertHistory, AlertRule, NetworkMetric, NewAlertHistory, NewAlertRule, NewServer,
    NewService, ProcessSnapshot, Server, ServiceHealth, ServiceStatusUpdate, SweepReport,
    SystemMetric, User,
};

/// Maximum rows to keep in memory per server and metric table
const MAX_METRICS_PER_SERVER: usize = 10_000;

#[derive(Default)]
struct State {
    next_id: i64,
    servers: Vec<Server>,
    users: Vec<User>,
    rules: Vec<AlertRule>,
    alerts: Vec<AlertHistory>,
    services: Vec<ServiceHealth>,
    system_metrics: HashMap<i64, VecDeque<SystemMetric>>,
    network_metrics: HashMap<i64, VecDeque<NetworkMetric>>,
    process_snapshots: HashMap<i64, VecDeque<ProcessSnapshot>>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn owner_email(&self, user_id: i64) -> Option<String> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.email.clone())
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T) {
    if buffer.len() >= MAX_METRICS_PER_SERVER {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

fn in_range<'a, T: 'a>(
    rows: Option<&'a VecDeque<T>>,
    query: &QueryRange,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<&'a T> {
    let mut matched: Vec<&T> = rows
        .into_iter()
        .flatten()
        .filter(|row| {
            let ts = timestamp(*row);
            ts >= query.start && ts <= query.end
        })
        .collect();
    matched.sort_by_key(|row| timestamp(*row));
    matched.truncate(query.limit.unwrap_or(usize::MAX));
    matched
}

fn purge<T>(
    tables: &mut HashMap<i64, VecDeque<T>>,
    before: DateTime<Utc>,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> u64 {
    let mut removed = 0;
    for rows in tables.values_mut() {
        let len = rows.len();
        rows.retain(|row| timestamp(row) >= before);
        removed += (len - rows.len()) as u64;
    }
    removed
}

/// In-memory storage backend
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn local_server(&self) -> StorageResult<Option<Server>> {
        let state = self.state.read().await;
        Ok(state.servers.iter().find(|s| s.is_local).cloned())
    }

    async fn server(&self, id: i64) -> StorageResult<Option<Server>> {
        let state = self.state.read().await;
        Ok(state.servers.iter().find(|s| s.id == id).cloned())
    }

    async fn active_servers(&self) -> StorageResult<Vec<Server>> {
        let state = self.state.read().await;
        Ok(state.servers.iter().filter(|s| s.is_active).cloned().collect())
    }

    async fn insert_server(&self, server: NewServer) -> StorageResult<Server> {
        let mut state = self.state.write().await;

        if server.is_local && state.servers.iter().any(|s| s.is_local) {
            return Err(StorageError::QueryFailed(
                "a local server already exists".to_string(),
            ));
        }

        let row = Server {
            id: state.next_id(),
            name: server.name,
            hostname: server.hostname,
            api_key: server.api_key,
            is_local: server.is_local,
            is_active: server.is_active,
            last_seen: None,
            created_at: Utc::now(),
        };
        state.servers.push(row.clone());
        Ok(row)
    }

    async fn touch_server(&self, id: i64, seen_at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let server = state
            .servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StorageError::NotFound {
                entity: "server",
                id,
            })?;
        server.last_seen = Some(seen_at);
        Ok(())
    }

    async fn record_system_metric(&self, metric: SystemMetric) -> StorageResult<()> {
        let mut state = self.state.write().await;

        let server = state
            .servers
            .iter_mut()
            .find(|s| s.id == metric.server_id)
            .ok_or(StorageError::NotFound {
                entity: "server",
                id: metric.server_id,
            })?;
        server.last_seen = Some(metric.timestamp);

        push_bounded(
            state.system_metrics.entry(metric.server_id).or_default(),
            metric,
        );
        Ok(())
    }

    async fn insert_network_metric(&self, metric: NetworkMetric) -> StorageResult<()> {
        let mut state = self.state.write().await;
        push_bounded(
            state.network_metrics.entry(metric.server_id).or_default(),
            metric,
        );
        Ok(())
    }

    async fn insert_process_snapshots(
        &self,
        snapshots: Vec<ProcessSnapshot>,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        debug!("in-memory backend: storing {} process snapshots", snapshots.len());
        for snapshot in snapshots {
            push_bounded(
                state.process_snapshots.entry(snapshot.server_id).or_default(),
                snapshot,
            );
        }
        Ok(())
    }

    async fn latest_system_metric(&self, server_id: i64) -> StorageResult<Option<SystemMetric>> {
        let state = self.state.read().await;
        Ok(state
            .system_metrics
            .get(&server_id)
            .and_then(|rows| rows.iter().max_by_key(|m| m.timestamp))
            .cloned())
    }

    async fn latest_network_metric(
        &self,
        server_id: i64,
    ) -> StorageResult<Option<NetworkMetric>> {
        let state = self.state.read().await;
        Ok(state
            .network_metrics
            .get(&server_id)
            .and_then(|rows| rows.iter().max_by_key(|m| m.timestamp))
            .cloned())
    }

    async fn query_system_metrics(&self, query: QueryRange) -> StorageResult<Vec<SystemMetric>> {
        let state = self.state.read().await;
        let rows = in_range(state.system_metrics.get(&query.server_id), &query, |m| {
            m.timestamp
        });
        Ok(rows.into_iter().cloned().collect())
    }

    async fn query_network_metrics(
        &self,
        query: QueryRange,
    ) -> StorageResult<Vec<NetworkMetric>> {
        let state = self.state.read().await;
        let rows = in_range(state.network_metrics.get(&query.server_id), &query, |m| {
            m.timestamp
        });
        Ok(rows.into_iter().cloned().collect())
    }

    async fn query_process_snapshots(
        &self,
        query: QueryRange,
    ) -> StorageResult<Vec<ProcessSnapshot>> {
        let state = self.state.read().await;
        let rows = in_range(state.process_snapshots.get(&query.server_id), &query, |p| {
            p.timestamp
        });
        Ok(rows.into_iter().cloned().collect())
    }

    async fn insert_user(&self, username: &str, email: &str) -> StorageResult<User> {
        let mut state = self.state.write().await;
        let user = User {
            id: state.next_id(),
            username: username.to_string(),
            email: email.to_string(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn insert_rule(&self, rule: NewAlertRule) -> StorageResult<AlertRule> {
        let mut state = self.state.write().await;
        let row = AlertRule {
            id: state.next_id(),
            owner_email: state.owner_email(rule.user_id),
            user_id: rule.user_id,
            server_id: rule.server_id,
            name: rule.name,
            metric_type: rule.metric_type,
            comparison: rule.comparison,
            threshold: rule.threshold,
            duration: rule.duration,
            notify_email: rule.notify_email,
            notify_sms: rule.notify_sms,
            notify_slack: rule.notify_slack,
            email_address: rule.email_address,
            phone_number: rule.phone_number,
            is_active: rule.is_active,
        };
        state.rules.push(row.clone());
        Ok(row)
    }

    async fn rule(&self, id: i64) -> StorageResult<Option<AlertRule>> {
        let state = self.state.read().await;
        Ok(state.rules.iter().find(|r| r.id == id).cloned())
    }

    async fn active_rules(&self) -> StorageResult<Vec<AlertRule>> {
        let state = self.state.read().await;
        Ok(state.rules.iter().filter(|r| r.is_active).cloned().collect())
    }

    async fn has_alert_since(
        &self,
        rule_id: i64,
        server_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let state = self.state.read().await;
        Ok(state.alerts.iter().any(|a| {
            a.rule_id == rule_id && a.server_id == server_id && a.triggered_at >= since
        }))
    }

    async fn insert_alert_if_quiet(
        &self,
        alert: NewAlertHistory,
        quiet_since: DateTime<Utc>,
    ) -> StorageResult<Option<AlertHistory>> {
        // check and insert under the same write guard
        let mut state = self.state.write().await;

        let recent = state.alerts.iter().any(|a| {
            a.rule_id == alert.rule_id
                && a.server_id == alert.server_id
                && a.triggered_at >= quiet_since
        });
        if recent {
            return Ok(None);
        }

        let row = AlertHistory {
            id: state.next_id(),
            rule_id: alert.rule_id,
            server_id: alert.server_id,
            triggered_at: alert.triggered_at,
            metric_value: alert.metric_value,
            message: alert.message,
            email_sent: alert.email_sent,
            sms_sent: alert.sms_sent,
            slack_sent: alert.slack_sent,
            acknowledged: false,
            acknowledged_at: None,
        };
        state.alerts.push(row.clone());
        Ok(Some(row))
    }

    async fn record_alert_delivery(
        &self,
        id: i64,
        delivery: AlertDelivery,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.email_sent = delivery.email_sent;
                alert.sms_sent = delivery.sms_sent;
                alert.slack_sent = delivery.slack_sent;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn alerts_for_rule(&self, rule_id: i64) -> StorageResult<Vec<AlertHistory>> {
        let state = self.state.read().await;
        let mut alerts: Vec<AlertHistory> = state
            .alerts
            .iter()
            .filter(|a| a.rule_id == rule_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn acknowledge_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceHealth> {
        let mut state = self.state.write().await;
        let row = ServiceHealth {
            id: state.next_id(),
            name: service.name,
            url: service.url,
            description: service.description,
            check_interval: service.check_interval,
            timeout: service.timeout,
            is_active: service.is_active,
            last_check_time: None,
            status_code: None,
            response_time: None,
            is_up: true,
            error_message: None,
            updated_at: None,
        };
        state.services.push(row.clone());
        Ok(row)
    }

    async fn service(&self, id: i64) -> StorageResult<Option<ServiceHealth>> {
        let state = self.state.read().await;
        Ok(state.services.iter().find(|s| s.id == id).cloned())
    }

    async fn active_services(&self) -> StorageResult<Vec<ServiceHealth>> {
        let state = self.state.read().await;
        Ok(state
            .services
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn update_service_status(
        &self,
        id: i64,
        update: ServiceStatusUpdate,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let service = state
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StorageError::NotFound {
                entity: "service",
                id,
            })?;

        service.is_up = update.is_up;
        service.status_code = update.status_code;
        service.response_time = update.response_time_ms;
        service.error_message = update.error_message;
        service.last_check_time = Some(checked_at);
        service.updated_at = Some(checked_at);
        Ok(())
    }

    async fn purge_older_than(
        &self,
        metrics_before: DateTime<Utc>,
        alerts_before: DateTime<Utc>,
    ) -> StorageResult<SweepReport> {
        let mut state = self.state.write().await;

        let system_metrics = purge(&mut state.system_metrics, metrics_before, |m| m.timestamp);
        let network_metrics = purge(&mut state.network_metrics, metrics_before, |m| m.timestamp);
        let process_snapshots =
            purge(&mut state.process_snapshots, metrics_before, |p| p.timestamp);

        let before = state.alerts.len();
        state.alerts.retain(|a| a.triggered_at >= alerts_before);
        let alert_history = (before - state.alerts.len()) as u64;

        Ok(SweepReport {
            system_metrics,
            network_metrics,
            process_snapshots,
            alert_history,
        })
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        let total: usize = state.system_metrics.values().map(|rows| rows.len()).sum();

        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());
        metadata.insert("servers".to_string(), state.servers.len().to_string());
        metadata.insert("system_metrics".to_string(), total.to_string());

        Ok(HealthStatus {
            healthy: true,
            message: "in-memory backend operational".to_string(),
            metadata,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("in-memory backend: close called (no-op)");
        Ok(())
    }
}
