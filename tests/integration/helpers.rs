//! Helper functions for integration tests

use std::sync::Arc;

use chrono::{DateTime, Utc};
use system_monitor::collector::{
    ConnectionCounts, HostProbe, HostSample, IoCounters, NetworkSample, PartitionSample,
    ProcessSample,
};
use system_monitor::config::{Config, StorageConfig};
use system_monitor::notify::{Dispatcher, MemoryTransport};
use system_monitor::storage::memory::MemoryBackend;
use system_monitor::storage::{
    AlertRule, NewAlertRule, NewServer, Server, StorageBackend, SystemMetric,
};

/// Probe with fixed readings
#[derive(Debug, Clone)]
pub struct TestProbe {
    pub cpu_percent: f64,
    pub processes: usize,
}

impl TestProbe {
    pub fn new(cpu_percent: f64) -> Self {
        Self {
            cpu_percent,
            processes: 3,
        }
    }
}

fn root_partition() -> PartitionSample {
    PartitionSample {
        device: "/dev/sda1".to_string(),
        mount_point: "/".to_string(),
        total: 100 * 1024 * 1024 * 1024,
        used: 25 * 1024 * 1024 * 1024,
        free: 75 * 1024 * 1024 * 1024,
        percent: 25.0,
    }
}

impl HostProbe for TestProbe {
    fn sample_system(&mut self) -> anyhow::Result<HostSample> {
        Ok(HostSample {
            cpu_percent: self.cpu_percent,
            cpu_freq: Some(3100.0),
            cpu_temp_c: None,
            memory_total: 8 * 1024 * 1024 * 1024,
            memory_used: 2 * 1024 * 1024 * 1024,
            memory_available: 6 * 1024 * 1024 * 1024,
            memory_percent: 25.0,
            root_partition: Some(root_partition()),
            io: Some(IoCounters {
                read_bytes: 4096,
                write_bytes: 8192,
                read_count: Some(10),
                write_count: Some(20),
            }),
        })
    }

    fn sample_network(&mut self) -> anyhow::Result<NetworkSample> {
        Ok(NetworkSample {
            bytes_sent: 1_000,
            bytes_recv: 2_000,
            packets_sent: 10,
            packets_recv: 20,
            connections: Some(ConnectionCounts {
                established: 4,
                listen: 2,
                time_wait: 1,
            }),
        })
    }

    fn sample_processes(&mut self, limit: usize) -> anyhow::Result<Vec<ProcessSample>> {
        Ok((0..self.processes.min(limit))
            .map(|i| ProcessSample {
                pid: 100 + i as u32,
                name: format!("worker-{i}"),
                username: Some("root".to_string()),
                cpu_percent: Some(10.0 - i as f64),
                memory_percent: Some(1.0),
                status: Some("running".to_string()),
            })
            .collect())
    }

    fn sample_partitions(&mut self) -> anyhow::Result<Vec<PartitionSample>> {
        Ok(vec![root_partition()])
    }
}

/// Config without persistence whose mail channel has a sender
pub fn test_config() -> Config {
    let mut config = Config {
        storage: StorageConfig::None,
        ..Config::default()
    };
    config.mail.default_sender = Some("monitor@example.com".to_string());
    config
}

pub struct TestEnv {
    pub storage: Arc<MemoryBackend>,
    pub transport: Arc<MemoryTransport>,
    pub dispatcher: Arc<Dispatcher>,
    pub server: Server,
}

pub async fn test_env_with(config: &Config) -> TestEnv {
    let storage = Arc::new(MemoryBackend::new());
    let transport = Arc::new(MemoryTransport::default());
    let dispatcher = Arc::new(Dispatcher::with_mail_transport(config, transport.clone()));
    let server = system_monitor::engine::ensure_local_server(storage.as_ref())
        .await
        .unwrap();

    TestEnv {
        storage,
        transport,
        dispatcher,
        server,
    }
}

pub async fn test_env() -> TestEnv {
    test_env_with(&test_config()).await
}

pub async fn create_rule(
    storage: &dyn StorageBackend,
    metric_type: &str,
    comparison: &str,
    threshold: f64,
    configure: impl FnOnce(&mut NewAlertRule),
) -> AlertRule {
    let user = storage
        .insert_user(&format!("user-{metric_type}-{threshold}"), "owner@example.com")
        .await
        .unwrap();
    let mut rule = NewAlertRule::new(user.id, "High CPU", metric_type, comparison, threshold);
    configure(&mut rule);
    storage.insert_rule(rule).await.unwrap()
}

pub fn system_metric(server_id: i64, cpu_percent: f64, timestamp: DateTime<Utc>) -> SystemMetric {
    SystemMetric {
        server_id,
        timestamp,
        cpu_percent,
        cpu_freq: Some(2400.0),
        cpu_temp_c: Some(55.0),
        memory_total: 16_000,
        memory_used: 4_000,
        memory_percent: 25.0,
        disk_total: Some(1_000),
        disk_used: Some(400),
        disk_percent: Some(40.0),
        io_read_bytes: Some(1),
        io_write_bytes: Some(2),
        io_read_count: Some(3),
        io_write_count: Some(4),
    }
}

pub fn remote_server(hostname: String) -> NewServer {
    NewServer {
        name: "Remote".to_string(),
        hostname,
        api_key: "remote-key".to_string(),
        is_local: false,
        is_active: true,
    }
}
