//! Local host metric collection
//!
//! The collector samples the host through a [`HostProbe`] and writes one
//! `SystemMetric`, one `NetworkMetric` and the top processes per tick for the
//! local server. Probes are synchronous and run on the blocking pool.

pub mod live;
pub mod probe;
pub mod procfs;
pub mod sensors;

use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, error, info, instrument};

use crate::storage::{
    NetworkMetric, ProcessSnapshot, Server, StorageBackend, SystemMetric,
};

pub use live::LiveMetrics;
pub use probe::SysinfoProbe;
pub use procfs::{ConnectionCounts, IoCounters};

/// Usage of one mounted partition
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSample {
    pub device: String,
    pub mount_point: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

/// Raw host reading before it is bound to a server and a timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct HostSample {
    pub cpu_percent: f64,
    pub cpu_freq: Option<f64>,
    pub cpu_temp_c: Option<f64>,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_available: u64,
    pub memory_percent: f64,
    pub root_partition: Option<PartitionSample>,
    pub io: Option<IoCounters>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSample {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub connections: Option<ConnectionCounts>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub username: Option<String>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub status: Option<String>,
}

/// Source of host readings
///
/// Implementations may block; the collector calls them from
/// `spawn_blocking`.
pub trait HostProbe: Send + 'static {
    fn sample_system(&mut self) -> anyhow::Result<HostSample>;

    fn sample_network(&mut self) -> anyhow::Result<NetworkSample>;

    /// The `limit` processes with the highest CPU usage
    fn sample_processes(&mut self, limit: usize) -> anyhow::Result<Vec<ProcessSample>>;

    fn sample_partitions(&mut self) -> anyhow::Result<Vec<PartitionSample>>;
}

impl HostSample {
    pub fn into_metric(self, server_id: i64, timestamp: DateTime<Utc>) -> SystemMetric {
        let disk = self.root_partition;
        let io = self.io;

        SystemMetric {
            server_id,
            timestamp,
            cpu_percent: self.cpu_percent,
            cpu_freq: self.cpu_freq,
            cpu_temp_c: self.cpu_temp_c,
            memory_total: self.memory_total,
            memory_used: self.memory_used,
            memory_percent: self.memory_percent,
            disk_total: disk.as_ref().map(|d| d.total),
            disk_used: disk.as_ref().map(|d| d.used),
            disk_percent: disk.as_ref().map(|d| d.percent),
            io_read_bytes: io.map(|io| io.read_bytes),
            io_write_bytes: io.map(|io| io.write_bytes),
            io_read_count: io.and_then(|io| io.read_count),
            io_write_count: io.and_then(|io| io.write_count),
        }
    }
}

impl NetworkSample {
    pub fn into_metric(self, server_id: i64, timestamp: DateTime<Utc>) -> NetworkMetric {
        NetworkMetric {
            server_id,
            timestamp,
            bytes_sent: self.bytes_sent,
            bytes_recv: self.bytes_recv,
            packets_sent: Some(self.packets_sent),
            packets_recv: Some(self.packets_recv),
            connections_established: self.connections.map(|c| c.established),
            connections_listen: self.connections.map(|c| c.listen),
            connections_time_wait: self.connections.map(|c| c.time_wait),
        }
    }
}

/// Outcome of one collection tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub system: bool,
    pub network: bool,
    pub processes: usize,
}

/// Timestamps are truncated to milliseconds, the resolution of the store
fn tick_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub struct MetricCollector<P: HostProbe> {
    storage: Arc<dyn StorageBackend>,
    probe: Arc<Mutex<P>>,
    process_limit: usize,
}

impl<P: HostProbe> Clone for MetricCollector<P> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            probe: self.probe.clone(),
            process_limit: self.process_limit,
        }
    }
}

impl<P: HostProbe> MetricCollector<P> {
    pub fn new(storage: Arc<dyn StorageBackend>, probe: P, process_limit: usize) -> Self {
        Self {
            storage,
            probe: Arc::new(Mutex::new(probe)),
            process_limit,
        }
    }

    /// Run a closure against the probe on the blocking pool
    pub async fn with_probe<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut P) -> anyhow::Result<T> + Send + 'static,
    {
        let probe = self.probe.clone();
        tokio::task::spawn_blocking(move || {
            let mut probe = probe
                .lock()
                .map_err(|_| anyhow!("host probe lock poisoned"))?;
            f(&mut *probe)
        })
        .await
        .context("host probe task failed")?
    }

    async fn local_server(&self) -> anyhow::Result<Option<Server>> {
        let server = self
            .storage
            .local_server()
            .await
            .context("failed to look up local server")?;

        if server.is_none() {
            debug!("no local server registered, skipping collection");
        }
        Ok(server)
    }

    /// Sample and store one `SystemMetric` for the local server
    ///
    /// Returns `None` when no local server exists yet.
    #[instrument(skip(self))]
    pub async fn collect_system_metrics(&self) -> anyhow::Result<Option<SystemMetric>> {
        let Some(server) = self.local_server().await? else {
            return Ok(None);
        };

        let sample = self
            .with_probe(|probe| probe.sample_system())
            .await
            .context("failed to sample system metrics")?;
        let metric = sample.into_metric(server.id, tick_timestamp());

        self.storage
            .record_system_metric(metric.clone())
            .await
            .context("failed to store system metric")?;

        debug!(cpu = metric.cpu_percent, "stored system metric");
        Ok(Some(metric))
    }

    #[instrument(skip(self))]
    pub async fn collect_network_metrics(&self) -> anyhow::Result<Option<NetworkMetric>> {
        let Some(server) = self.local_server().await? else {
            return Ok(None);
        };

        let sample = self
            .with_probe(|probe| probe.sample_network())
            .await
            .context("failed to sample network metrics")?;
        let metric = sample.into_metric(server.id, tick_timestamp());

        self.storage
            .insert_network_metric(metric.clone())
            .await
            .context("failed to store network metric")?;

        Ok(Some(metric))
    }

    /// Store the top processes by CPU; returns the number of rows written
    #[instrument(skip(self))]
    pub async fn collect_process_snapshots(&self) -> anyhow::Result<usize> {
        if self.process_limit == 0 {
            return Ok(0);
        }
        let Some(server) = self.local_server().await? else {
            return Ok(0);
        };

        let limit = self.process_limit;
        let processes = self
            .with_probe(move |probe| probe.sample_processes(limit))
            .await
            .context("failed to sample processes")?;

        let timestamp = tick_timestamp();
        let snapshots: Vec<ProcessSnapshot> = processes
            .into_iter()
            .map(|p| ProcessSnapshot {
                server_id: server.id,
                timestamp,
                pid: p.pid,
                name: p.name,
                username: p.username,
                cpu_percent: p.cpu_percent,
                memory_percent: p.memory_percent,
                status: p.status,
            })
            .collect();
        let count = snapshots.len();

        self.storage
            .insert_process_snapshots(snapshots)
            .await
            .context("failed to store process snapshots")?;

        Ok(count)
    }

    /// One collection tick; each part fails on its own and is logged
    pub async fn collect_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.collect_system_metrics().await {
            Ok(stored) => report.system = stored.is_some(),
            Err(e) => error!("Error collecting system metrics: {e:#}"),
        }

        match self.collect_network_metrics().await {
            Ok(stored) => report.network = stored.is_some(),
            Err(e) => error!("Error collecting network metrics: {e:#}"),
        }

        match self.collect_process_snapshots().await {
            Ok(count) => report.processes = count,
            Err(e) => error!("Error collecting process snapshots: {e:#}"),
        }

        if report.system || report.network {
            info!(
                system = report.system,
                network = report.network,
                processes = report.processes,
                "collection tick complete"
            );
        }
        report
    }

    /// Sample the document served on `/api/metrics`
    pub async fn live_metrics(&self) -> anyhow::Result<LiveMetrics> {
        self.with_probe(|probe| LiveMetrics::sample(probe)).await
    }
}
