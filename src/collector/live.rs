//! The live metrics document served on `GET /api/metrics`
//!
//! Sizes are rendered human readable (`"1.17GB"`) because dashboards show the
//! document as-is; percentages and counters stay numeric.

use serde::{Deserialize, Serialize};

use super::sensors::celsius_to_fahrenheit;
use super::{ConnectionCounts, HostProbe};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub cpu: CpuInformation,
    pub memory: MemoryInformation,
    pub disk: Vec<PartitionInformation>,
    pub io: IoInformation,
    pub network: NetworkInformation,
    pub connections: Option<ConnectionCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInformation {
    pub percent: f64,

    /// Current frequency, e.g. `"2400.00Mhz"`
    pub freq: String,
    pub temp_c: Option<f64>,
    pub temp_f: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub total: String,
    pub available: String,
    pub used: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInformation {
    pub device: String,
    pub mountpoint: String,
    pub total: String,
    pub used: String,
    pub free: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoInformation {
    pub read_bytes: Option<String>,
    pub write_bytes: Option<String>,
    pub read_count: Option<u64>,
    pub write_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInformation {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// Scale a byte count to a two-decimal string with binary units
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["", "K", "M", "G", "T", "P"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.2}EB")
}

impl LiveMetrics {
    pub fn sample<P: HostProbe + ?Sized>(probe: &mut P) -> anyhow::Result<Self> {
        let system = probe.sample_system()?;
        let network = probe.sample_network()?;
        let partitions = probe.sample_partitions()?;

        Ok(Self {
            cpu: CpuInformation {
                percent: system.cpu_percent,
                freq: format!("{:.2}Mhz", system.cpu_freq.unwrap_or(0.0)),
                temp_c: system.cpu_temp_c,
                temp_f: system.cpu_temp_c.map(celsius_to_fahrenheit),
            },
            memory: MemoryInformation {
                total: format_size(system.memory_total),
                available: format_size(system.memory_available),
                used: format_size(system.memory_used),
                percent: system.memory_percent,
            },
            disk: partitions
                .into_iter()
                .map(|p| PartitionInformation {
                    device: p.device,
                    mountpoint: p.mount_point,
                    total: format_size(p.total),
                    used: format_size(p.used),
                    free: format_size(p.free),
                    percent: p.percent,
                })
                .collect(),
            io: IoInformation {
                read_bytes: system.io.map(|io| format_size(io.read_bytes)),
                write_bytes: system.io.map(|io| format_size(io.write_bytes)),
                read_count: system.io.and_then(|io| io.read_count),
                write_count: system.io.and_then(|io| io.write_count),
            },
            network: NetworkInformation {
                bytes_sent: network.bytes_sent,
                bytes_recv: network.bytes_recv,
                packets_sent: network.packets_sent,
                packets_recv: network.packets_recv,
            },
            connections: network.connections,
        })
    }
}
