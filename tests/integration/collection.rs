//! Integration tests for metric collection
//!
//! These tests verify that:
//! - A collected metric reads back exactly through the latest-value query
//! - Network counters and connection states are stored per tick
//! - Process snapshots are written in one batch
//! - Collection without a local server is a silent no-op

use std::sync::Arc;

use chrono::Duration;
use pretty_assertions::assert_eq;
use system_monitor::collector::MetricCollector;
use system_monitor::engine::{Engine, MonitorContext, ensure_local_server};
use system_monitor::notify::Dispatcher;
use system_monitor::storage::memory::MemoryBackend;
use system_monitor::storage::{QueryRange, StorageBackend};

use crate::helpers::{TestProbe, test_config};

#[tokio::test]
async fn test_collected_metric_reads_back_exactly() {
    let storage = Arc::new(MemoryBackend::new());
    let server = ensure_local_server(storage.as_ref()).await.unwrap();
    let collector = MetricCollector::new(storage.clone(), TestProbe::new(37.5), 10);

    let stored = collector.collect_system_metrics().await.unwrap().unwrap();
    let latest = storage.latest_system_metric(server.id).await.unwrap().unwrap();

    assert_eq!(latest, stored);
    assert_eq!(latest.cpu_percent, 37.5);
    assert_eq!(latest.disk_percent, Some(25.0));
    assert_eq!(latest.io_write_count, Some(20));

    let server = storage.server(server.id).await.unwrap().unwrap();
    assert_eq!(server.last_seen, Some(stored.timestamp));
}

#[tokio::test]
async fn test_tick_writes_all_tables() {
    let storage = Arc::new(MemoryBackend::new());
    let server = ensure_local_server(storage.as_ref()).await.unwrap();
    let collector = MetricCollector::new(storage.clone(), TestProbe::new(12.0), 2);

    let report = collector.collect_tick().await;
    assert!(report.system);
    assert!(report.network);
    assert_eq!(report.processes, 2);

    let network = storage.latest_network_metric(server.id).await.unwrap().unwrap();
    assert_eq!(network.bytes_sent, 1_000);
    assert_eq!(network.connections_established, Some(4));
    assert_eq!(network.connections_listen, Some(2));
    assert_eq!(network.connections_time_wait, Some(1));

    let range = QueryRange {
        server_id: server.id,
        start: network.timestamp - Duration::minutes(1),
        end: network.timestamp + Duration::minutes(1),
        limit: None,
    };
    let snapshots = storage.query_process_snapshots(range).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].name, "worker-0");
}

#[tokio::test]
async fn test_no_local_server_is_noop() {
    let storage = Arc::new(MemoryBackend::new());
    let collector = MetricCollector::new(storage.clone(), TestProbe::new(50.0), 10);

    let report = collector.collect_tick().await;

    assert!(!report.system);
    assert!(!report.network);
    assert_eq!(report.processes, 0);
    assert!(storage.active_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_live_metrics_document() {
    let storage = Arc::new(MemoryBackend::new());
    let collector = MetricCollector::new(storage, TestProbe::new(20.0), 0);

    let live = collector.live_metrics().await.unwrap();
    let json = serde_json::to_value(&live).unwrap();

    assert_eq!(json["cpu"]["percent"], 20.0);
    assert_eq!(json["cpu"]["freq"], "3100.00Mhz");
    assert_eq!(json["memory"]["total"], "8.00GB");
    assert_eq!(json["disk"][0]["mountpoint"], "/");
    assert_eq!(json["connections"]["established"], 4);
}

#[tokio::test(start_paused = true)]
async fn test_engine_jobs_collect_and_alert() {
    let config = test_config();
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let dispatcher = Dispatcher::from_config(&config);
    let context = MonitorContext::new(config, storage.clone(), dispatcher);
    let engine = Engine::new(context, TestProbe::new(99.0)).unwrap();
    let server = engine.bootstrap().await.unwrap();

    let rule = crate::helpers::create_rule(storage.as_ref(), "cpu", ">", 90.0, |_| {}).await;

    let mut scheduler = engine.build_scheduler().unwrap();
    scheduler.start();
    // first collection and first alert pass both fire at 60s
    tokio::time::sleep(std::time::Duration::from_secs(125)).await;
    scheduler.shutdown().await;

    assert!(storage.latest_system_metric(server.id).await.unwrap().is_some());
    assert_eq!(storage.alerts_for_rule(rule.id).await.unwrap().len(), 1);
}
