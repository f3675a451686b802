//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds. Unsigned counters are stored
//! as SQLite integers (i64), which covers every realistic counter value.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, QueryRange, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AlertDelivery, AlertHistory, AlertRule, NetworkMetric, NewAlertHistory, NewAlertRule, NewServer,
    NewService, ProcessSnapshot, Server, ServiceHealth, ServiceStatusUpdate, SweepReport,
    SystemMetric, User,
};

const SYSTEM_METRIC_COLUMNS: &str = "server_id, timestamp, cpu_percent, cpu_freq, cpu_temp_c, \
     memory_total, memory_used, memory_percent, disk_total, disk_used, disk_percent, \
     io_read_bytes, io_write_bytes, io_read_count, io_write_count";

const NETWORK_METRIC_COLUMNS: &str = "server_id, timestamp, bytes_sent, bytes_recv, \
     packets_sent, packets_recv, connections_established, connections_listen, \
     connections_time_wait";

const PROCESS_SNAPSHOT_COLUMNS: &str =
    "server_id, timestamp, pid, name, username, cpu_percent, memory_percent, status";

const ALERT_RULE_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.server_id, r.name, r.metric_type, r.comparison, r.threshold,
           r.duration, r.notify_email, r.notify_sms, r.notify_slack, r.email_address,
           r.phone_number, r.is_active, u.email AS owner_email
    FROM alert_rules r
    LEFT JOIN users u ON u.id = r.user_id
"#;

const ALERT_HISTORY_COLUMNS: &str = "id, rule_id, server_id, triggered_at, metric_value, message, \
     email_sent, sms_sent, slack_sent, acknowledged, acknowledged_at";

const SERVICE_COLUMNS: &str = "id, name, url, description, check_interval, timeout, is_active, \
     last_check_time, status_code, response_time, is_up, error_message, updated_at";

/// SQLite storage backend
///
/// This backend stores everything in a local SQLite database file.
/// It's ideal for small to medium deployments (1-100 servers).
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for optimal performance (WAL mode, etc.)
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30)); // Retry on lock contention

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn opt_timestamp(row: &SqliteRow, column: &str) -> StorageResult<Option<DateTime<Utc>>> {
        Ok(row
            .try_get::<Option<i64>, _>(column)?
            .map(Self::millis_to_timestamp))
    }

    fn opt_u64(row: &SqliteRow, column: &str) -> StorageResult<Option<u64>> {
        Ok(row.try_get::<Option<i64>, _>(column)?.map(|v| v.max(0) as u64))
    }

    fn opt_u32(row: &SqliteRow, column: &str) -> StorageResult<Option<u32>> {
        Ok(row.try_get::<Option<i64>, _>(column)?.map(|v| v.max(0) as u32))
    }

    fn server_from_row(row: &SqliteRow) -> StorageResult<Server> {
        Ok(Server {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            hostname: row.try_get("hostname")?,
            api_key: row.try_get("api_key")?,
            is_local: row.try_get("is_local")?,
            is_active: row.try_get("is_active")?,
            last_seen: Self::opt_timestamp(row, "last_seen")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn system_metric_from_row(row: &SqliteRow) -> StorageResult<SystemMetric> {
        Ok(SystemMetric {
            server_id: row.try_get("server_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
            cpu_percent: row.try_get("cpu_percent")?,
            cpu_freq: row.try_get("cpu_freq")?,
            cpu_temp_c: row.try_get("cpu_temp_c")?,
            memory_total: row.try_get::<i64, _>("memory_total")?.max(0) as u64,
            memory_used: row.try_get::<i64, _>("memory_used")?.max(0) as u64,
            memory_percent: row.try_get("memory_percent")?,
            disk_total: Self::opt_u64(row, "disk_total")?,
            disk_used: Self::opt_u64(row, "disk_used")?,
            disk_percent: row.try_get("disk_percent")?,
            io_read_bytes: Self::opt_u64(row, "io_read_bytes")?,
            io_write_bytes: Self::opt_u64(row, "io_write_bytes")?,
            io_read_count: Self::opt_u64(row, "io_read_count")?,
            io_write_count: Self::opt_u64(row, "io_write_count")?,
        })
    }

    fn network_metric_from_row(row: &SqliteRow) -> StorageResult<NetworkMetric> {
        Ok(NetworkMetric {
            server_id: row.try_get("server_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
            bytes_sent: row.try_get::<i64, _>("bytes_sent")?.max(0) as u64,
            bytes_recv: row.try_get::<i64, _>("bytes_recv")?.max(0) as u64,
            packets_sent: Self::opt_u64(row, "packets_sent")?,
            packets_recv: Self::opt_u64(row, "packets_recv")?,
            connections_established: Self::opt_u32(row, "connections_established")?,
            connections_listen: Self::opt_u32(row, "connections_listen")?,
            connections_time_wait: Self::opt_u32(row, "connections_time_wait")?,
        })
    }

    fn process_snapshot_from_row(row: &SqliteRow) -> StorageResult<ProcessSnapshot> {
        Ok(ProcessSnapshot {
            server_id: row.try_get("server_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
            pid: row.try_get::<i64, _>("pid")?.max(0) as u32,
            name: row.try_get("name")?,
            username: row.try_get("username")?,
            cpu_percent: row.try_get("cpu_percent")?,
            memory_percent: row.try_get("memory_percent")?,
            status: row.try_get("status")?,
        })
    }

    fn rule_from_row(row: &SqliteRow) -> StorageResult<AlertRule> {
        let duration: i64 = row.try_get("duration")?;
        if duration < 0 {
            warn!("alert rule has negative duration {duration}, treating it as 0");
        }

        Ok(AlertRule {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            server_id: row.try_get("server_id")?,
            name: row.try_get("name")?,
            metric_type: row.try_get("metric_type")?,
            comparison: row.try_get("comparison")?,
            threshold: row.try_get("threshold")?,
            duration: duration.clamp(0, u32::MAX as i64) as u32,
            notify_email: row.try_get("notify_email")?,
            notify_sms: row.try_get("notify_sms")?,
            notify_slack: row.try_get("notify_slack")?,
            email_address: row.try_get("email_address")?,
            phone_number: row.try_get("phone_number")?,
            is_active: row.try_get("is_active")?,
            owner_email: row.try_get("owner_email")?,
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<AlertHistory> {
        Ok(AlertHistory {
            id: row.try_get("id")?,
            rule_id: row.try_get("rule_id")?,
            server_id: row.try_get("server_id")?,
            triggered_at: Self::millis_to_timestamp(row.try_get("triggered_at")?),
            metric_value: row.try_get("metric_value")?,
            message: row.try_get("message")?,
            email_sent: row.try_get("email_sent")?,
            sms_sent: row.try_get("sms_sent")?,
            slack_sent: row.try_get("slack_sent")?,
            acknowledged: row.try_get("acknowledged")?,
            acknowledged_at: Self::opt_timestamp(row, "acknowledged_at")?,
        })
    }

    fn service_from_row(row: &SqliteRow) -> StorageResult<ServiceHealth> {
        let status_code = row
            .try_get::<Option<i64>, _>("status_code")?
            .map(|code| {
                u16::try_from(code)
                    .map_err(|_| StorageError::InvalidValue(format!("status code {code}")))
            })
            .transpose()?;

        Ok(ServiceHealth {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            description: row.try_get("description")?,
            check_interval: row.try_get::<i64, _>("check_interval")?.max(0) as u32,
            timeout: row.try_get::<i64, _>("timeout")?.max(0) as u32,
            is_active: row.try_get("is_active")?,
            last_check_time: Self::opt_timestamp(row, "last_check_time")?,
            status_code,
            response_time: row.try_get("response_time")?,
            is_up: row.try_get("is_up")?,
            error_message: row.try_get("error_message")?,
            updated_at: Self::opt_timestamp(row, "updated_at")?,
        })
    }

    fn limit_clause(limit: Option<usize>) -> String {
        limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn local_server(&self) -> StorageResult<Option<Server>> {
        let row = sqlx::query("SELECT * FROM servers WHERE is_local = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::server_from_row).transpose()
    }

    async fn server(&self, id: i64) -> StorageResult<Option<Server>> {
        let row = sqlx::query("SELECT * FROM servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::server_from_row).transpose()
    }

    async fn active_servers(&self) -> StorageResult<Vec<Server>> {
        let rows = sqlx::query("SELECT * FROM servers WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::server_from_row).collect()
    }

    #[instrument(skip(self, server), fields(name = %server.name))]
    async fn insert_server(&self, server: NewServer) -> StorageResult<Server> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO servers (name, hostname, api_key, is_local, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&server.name)
        .bind(&server.hostname)
        .bind(&server.api_key)
        .bind(server.is_local)
        .bind(server.is_active)
        .bind(Self::timestamp_to_millis(&created_at))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("inserted server {id}");

        Ok(Server {
            id,
            name: server.name,
            hostname: server.hostname,
            api_key: server.api_key,
            is_local: server.is_local,
            is_active: server.is_active,
            last_seen: None,
            created_at: Self::millis_to_timestamp(Self::timestamp_to_millis(&created_at)),
        })
    }

    async fn touch_server(&self, id: i64, seen_at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE servers SET last_seen = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&seen_at))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "server",
                id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, metric), fields(server_id = metric.server_id))]
    async fn record_system_metric(&self, metric: SystemMetric) -> StorageResult<()> {
        let timestamp = Self::timestamp_to_millis(&metric.timestamp);

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO system_metrics ({SYSTEM_METRIC_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(metric.server_id)
        .bind(timestamp)
        .bind(metric.cpu_percent)
        .bind(metric.cpu_freq)
        .bind(metric.cpu_temp_c)
        .bind(metric.memory_total as i64)
        .bind(metric.memory_used as i64)
        .bind(metric.memory_percent)
        .bind(metric.disk_total.map(|v| v as i64))
        .bind(metric.disk_used.map(|v| v as i64))
        .bind(metric.disk_percent)
        .bind(metric.io_read_bytes.map(|v| v as i64))
        .bind(metric.io_write_bytes.map(|v| v as i64))
        .bind(metric.io_read_count.map(|v| v as i64))
        .bind(metric.io_write_count.map(|v| v as i64))
        .execute(&mut *tx)
        .await?;

        let touched = sqlx::query("UPDATE servers SET last_seen = ? WHERE id = ?")
            .bind(timestamp)
            .bind(metric.server_id)
            .execute(&mut *tx)
            .await?;

        if touched.rows_affected() == 0 {
            // dropping the transaction rolls back the metric insert
            return Err(StorageError::NotFound {
                entity: "server",
                id: metric.server_id,
            });
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, metric), fields(server_id = metric.server_id))]
    async fn insert_network_metric(&self, metric: NetworkMetric) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO network_metrics ({NETWORK_METRIC_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(metric.server_id)
        .bind(Self::timestamp_to_millis(&metric.timestamp))
        .bind(metric.bytes_sent as i64)
        .bind(metric.bytes_recv as i64)
        .bind(metric.packets_sent.map(|v| v as i64))
        .bind(metric.packets_recv.map(|v| v as i64))
        .bind(metric.connections_established.map(i64::from))
        .bind(metric.connections_listen.map(i64::from))
        .bind(metric.connections_time_wait.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, snapshots), fields(count = snapshots.len()))]
    async fn insert_process_snapshots(
        &self,
        snapshots: Vec<ProcessSnapshot>,
    ) -> StorageResult<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for snapshot in snapshots {
            sqlx::query(&format!(
                "INSERT INTO process_snapshots ({PROCESS_SNAPSHOT_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(snapshot.server_id)
            .bind(Self::timestamp_to_millis(&snapshot.timestamp))
            .bind(i64::from(snapshot.pid))
            .bind(&snapshot.name)
            .bind(&snapshot.username)
            .bind(snapshot.cpu_percent)
            .bind(snapshot.memory_percent)
            .bind(&snapshot.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn latest_system_metric(&self, server_id: i64) -> StorageResult<Option<SystemMetric>> {
        let row = sqlx::query(&format!(
            "SELECT {SYSTEM_METRIC_COLUMNS} FROM system_metrics \
             WHERE server_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::system_metric_from_row).transpose()
    }

    async fn latest_network_metric(
        &self,
        server_id: i64,
    ) -> StorageResult<Option<NetworkMetric>> {
        let row = sqlx::query(&format!(
            "SELECT {NETWORK_METRIC_COLUMNS} FROM network_metrics \
             WHERE server_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::network_metric_from_row).transpose()
    }

    #[instrument(skip(self), fields(server_id = query.server_id))]
    async fn query_system_metrics(&self, query: QueryRange) -> StorageResult<Vec<SystemMetric>> {
        let rows = sqlx::query(&format!(
            "SELECT {SYSTEM_METRIC_COLUMNS} FROM system_metrics \
             WHERE server_id = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp ASC, id ASC {}",
            Self::limit_clause(query.limit)
        ))
        .bind(query.server_id)
        .bind(Self::timestamp_to_millis(&query.start))
        .bind(Self::timestamp_to_millis(&query.end))
        .fetch_all(&self.pool)
        .await?;

        let results: Vec<SystemMetric> = rows
            .iter()
            .map(Self::system_metric_from_row)
            .collect::<StorageResult<_>>()?;
        debug!("query returned {} system metrics", results.len());
        Ok(results)
    }

    #[instrument(skip(self), fields(server_id = query.server_id))]
    async fn query_network_metrics(
        &self,
        query: QueryRange,
    ) -> StorageResult<Vec<NetworkMetric>> {
        let rows = sqlx::query(&format!(
            "SELECT {NETWORK_METRIC_COLUMNS} FROM network_metrics \
             WHERE server_id = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp ASC, id ASC {}",
            Self::limit_clause(query.limit)
        ))
        .bind(query.server_id)
        .bind(Self::timestamp_to_millis(&query.start))
        .bind(Self::timestamp_to_millis(&query.end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::network_metric_from_row).collect()
    }

    async fn query_process_snapshots(
        &self,
        query: QueryRange,
    ) -> StorageResult<Vec<ProcessSnapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROCESS_SNAPSHOT_COLUMNS} FROM process_snapshots \
             WHERE server_id = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp ASC, id ASC {}",
            Self::limit_clause(query.limit)
        ))
        .bind(query.server_id)
        .bind(Self::timestamp_to_millis(&query.start))
        .bind(Self::timestamp_to_millis(&query.end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::process_snapshot_from_row).collect()
    }

    async fn insert_user(&self, username: &str, email: &str) -> StorageResult<User> {
        let result = sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
            .bind(username)
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    #[instrument(skip(self, rule), fields(name = %rule.name))]
    async fn insert_rule(&self, rule: NewAlertRule) -> StorageResult<AlertRule> {
        let result = sqlx::query(
            r#"
            INSERT INTO alert_rules (
                user_id, server_id, name, metric_type, threshold, comparison, duration,
                notify_email, notify_sms, notify_slack, email_address, phone_number, is_active
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.user_id)
        .bind(rule.server_id)
        .bind(&rule.name)
        .bind(&rule.metric_type)
        .bind(rule.threshold)
        .bind(&rule.comparison)
        .bind(i64::from(rule.duration))
        .bind(rule.notify_email)
        .bind(rule.notify_sms)
        .bind(rule.notify_slack)
        .bind(&rule.email_address)
        .bind(&rule.phone_number)
        .bind(rule.is_active)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.rule(id).await?.ok_or(StorageError::NotFound {
            entity: "alert rule",
            id,
        })
    }

    async fn rule(&self, id: i64) -> StorageResult<Option<AlertRule>> {
        let row = sqlx::query(&format!("{ALERT_RULE_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::rule_from_row).transpose()
    }

    async fn active_rules(&self) -> StorageResult<Vec<AlertRule>> {
        let rows = sqlx::query(&format!(
            "{ALERT_RULE_SELECT} WHERE r.is_active = 1 ORDER BY r.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::rule_from_row).collect()
    }

    async fn has_alert_since(
        &self,
        rule_id: i64,
        server_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM alert_history
                WHERE rule_id = ? AND server_id = ? AND triggered_at >= ?
            )
            "#,
        )
        .bind(rule_id)
        .bind(server_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 != 0)
    }

    #[instrument(skip(self, alert), fields(rule_id = alert.rule_id, server_id = alert.server_id))]
    async fn insert_alert_if_quiet(
        &self,
        alert: NewAlertHistory,
        quiet_since: DateTime<Utc>,
    ) -> StorageResult<Option<AlertHistory>> {
        let triggered_at = Self::timestamp_to_millis(&alert.triggered_at);

        // single statement: SQLite serializes writers, so the NOT EXISTS
        // check cannot interleave with a concurrent insert
        let result = sqlx::query(
            r#"
            INSERT INTO alert_history (
                rule_id, server_id, triggered_at, metric_value, message,
                email_sent, sms_sent, slack_sent
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM alert_history
                WHERE rule_id = ? AND server_id = ? AND triggered_at >= ?
            )
            "#,
        )
        .bind(alert.rule_id)
        .bind(alert.server_id)
        .bind(triggered_at)
        .bind(alert.metric_value)
        .bind(&alert.message)
        .bind(alert.email_sent)
        .bind(alert.sms_sent)
        .bind(alert.slack_sent)
        .bind(alert.rule_id)
        .bind(alert.server_id)
        .bind(Self::timestamp_to_millis(&quiet_since))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("alert suppressed, window already holds an alert");
            return Ok(None);
        }

        Ok(Some(AlertHistory {
            id: result.last_insert_rowid(),
            rule_id: alert.rule_id,
            server_id: alert.server_id,
            triggered_at: Self::millis_to_timestamp(triggered_at),
            metric_value: alert.metric_value,
            message: alert.message,
            email_sent: alert.email_sent,
            sms_sent: alert.sms_sent,
            slack_sent: alert.slack_sent,
            acknowledged: false,
            acknowledged_at: None,
        }))
    }

    async fn record_alert_delivery(
        &self,
        id: i64,
        delivery: AlertDelivery,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE alert_history SET email_sent = ?, sms_sent = ?, slack_sent = ? WHERE id = ?",
        )
        .bind(delivery.email_sent)
        .bind(delivery.sms_sent)
        .bind(delivery.slack_sent)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn alerts_for_rule(&self, rule_id: i64) -> StorageResult<Vec<AlertHistory>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_HISTORY_COLUMNS} FROM alert_history \
             WHERE rule_id = ? ORDER BY triggered_at DESC, id DESC"
        ))
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn acknowledge_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE alert_history SET acknowledged = 1, acknowledged_at = ? WHERE id = ?",
        )
        .bind(Self::timestamp_to_millis(&at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, service), fields(name = %service.name))]
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceHealth> {
        let result = sqlx::query(
            r#"
            INSERT INTO service_health (name, url, description, check_interval, timeout, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&service.name)
        .bind(&service.url)
        .bind(&service.description)
        .bind(i64::from(service.check_interval))
        .bind(i64::from(service.timeout))
        .bind(service.is_active)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.service(id).await?.ok_or(StorageError::NotFound {
            entity: "service",
            id,
        })
    }

    async fn service(&self, id: i64) -> StorageResult<Option<ServiceHealth>> {
        let row = sqlx::query(&format!(
            "SELECT {SERVICE_COLUMNS} FROM service_health WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::service_from_row).transpose()
    }

    async fn active_services(&self) -> StorageResult<Vec<ServiceHealth>> {
        let rows = sqlx::query(&format!(
            "SELECT {SERVICE_COLUMNS} FROM service_health WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::service_from_row).collect()
    }

    #[instrument(skip(self, update))]
    async fn update_service_status(
        &self,
        id: i64,
        update: ServiceStatusUpdate,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let checked_at = Self::timestamp_to_millis(&checked_at);

        let result = sqlx::query(
            r#"
            UPDATE service_health
            SET last_check_time = ?, is_up = ?, status_code = ?, response_time = ?,
                error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(checked_at)
        .bind(update.is_up)
        .bind(update.status_code.map(i64::from))
        .bind(update.response_time_ms)
        .bind(&update.error_message)
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "service",
                id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_older_than(
        &self,
        metrics_before: DateTime<Utc>,
        alerts_before: DateTime<Utc>,
    ) -> StorageResult<SweepReport> {
        let metrics_cutoff = Self::timestamp_to_millis(&metrics_before);
        let alerts_cutoff = Self::timestamp_to_millis(&alerts_before);

        let mut tx = self.pool.begin().await?;

        let system_metrics = sqlx::query("DELETE FROM system_metrics WHERE timestamp < ?")
            .bind(metrics_cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let network_metrics = sqlx::query("DELETE FROM network_metrics WHERE timestamp < ?")
            .bind(metrics_cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let process_snapshots = sqlx::query("DELETE FROM process_snapshots WHERE timestamp < ?")
            .bind(metrics_cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let alert_history = sqlx::query("DELETE FROM alert_history WHERE triggered_at < ?")
            .bind(alerts_cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(SweepReport {
            system_metrics,
            network_metrics,
            process_snapshots,
            alert_history,
        })
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
