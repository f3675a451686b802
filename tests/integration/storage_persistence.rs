//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - The engine runs unchanged on top of the SQLite backend
//! - Collected metrics read back exactly after millisecond storage
//! - The de-duplication window holds across backend instances
//! - Data survives reopening the database

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use system_monitor::alerts::AlertEvaluator;
use system_monitor::collector::MetricCollector;
use system_monitor::engine::ensure_local_server;
use system_monitor::notify::{Dispatcher, MemoryTransport};
use system_monitor::retention::RetentionSweeper;
use system_monitor::storage::sqlite::SqliteBackend;
use system_monitor::storage::{NewAlertRule, StorageBackend};
use tempfile::tempdir;

use crate::helpers::{TestProbe, system_metric, test_config};

#[tokio::test]
async fn test_collect_evaluate_and_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("monitor.db");

    let storage: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let server = ensure_local_server(storage.as_ref()).await.unwrap();

    let collector = MetricCollector::new(storage.clone(), TestProbe::new(96.25), 5);
    let stored = collector.collect_system_metrics().await.unwrap().unwrap();
    let latest = storage.latest_system_metric(server.id).await.unwrap().unwrap();
    assert_eq!(latest, stored);

    let user = storage.insert_user("ops", "ops@example.com").await.unwrap();
    let rule = storage
        .insert_rule(NewAlertRule::new(user.id, "High CPU", "cpu", ">", 90.0))
        .await
        .unwrap();

    let transport = Arc::new(MemoryTransport::default());
    let dispatcher = Arc::new(Dispatcher::with_mail_transport(&test_config(), transport.clone()));
    let evaluator = AlertEvaluator::new(storage.clone(), dispatcher.clone());
    let now = Utc::now();
    evaluator.check_and_notify_alerts_at(now).await;
    evaluator.check_and_notify_alerts_at(now + Duration::seconds(10)).await;

    assert_eq!(transport.sent().len(), 1);
    assert_eq!(transport.sent()[0].to, "ops@example.com");
    storage.close().await.unwrap();

    // reopen: history and window survive
    let storage: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let evaluator = AlertEvaluator::new(storage.clone(), dispatcher);
    let report = evaluator
        .check_and_notify_alerts_at(now + Duration::seconds(20))
        .await;
    assert_eq!(report.suppressed, 1);

    let history = storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].metric_value, 96.25);
    assert!(history[0].email_sent);

    let local = ensure_local_server(storage.as_ref()).await.unwrap();
    assert_eq!(local.id, server.id);
    assert_eq!(local.api_key, server.api_key);
}

#[tokio::test]
async fn test_sweep_on_sqlite() {
    let temp_dir = tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(
        SqliteBackend::new(temp_dir.path().join("sweep.db"))
            .await
            .unwrap(),
    );
    let server = ensure_local_server(storage.as_ref()).await.unwrap();

    let now = Utc::now();
    for days in [45, 20, 1] {
        storage
            .record_system_metric(system_metric(server.id, 1.0, now - Duration::days(days)))
            .await
            .unwrap();
    }

    let report = RetentionSweeper::new(storage.clone(), 30, 90)
        .sweep_at(now)
        .await
        .unwrap();
    assert_eq!(report.system_metrics, 1);
    assert_eq!(report.total(), 1);
}
