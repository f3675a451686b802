use std::path::Path;

use sysinfo::{
    Components, Disks, MINIMUM_CPU_UPDATE_INTERVAL, Networks, ProcessesToUpdate, System, Users,
};
use tracing::{debug, trace};

use super::procfs::{IoCounters, read_connection_counts, read_io_counters};
use super::sensors::{SensorReading, select_cpu_temperature};
use super::{HostProbe, HostSample, NetworkSample, PartitionSample, ProcessSample};

/// `HostProbe` backed by `sysinfo`, with `/proc` readers for the counters
/// `sysinfo` does not provide
///
/// The probe keeps its `System` between ticks so CPU usage is measured over
/// the interval since the previous sample.
pub struct SysinfoProbe {
    sys: System,
    disks: Disks,
    networks: Networks,
    components: Components,
    users: Users,
    temperature_sensors: Vec<String>,
    cpu_primed: bool,
}

impl SysinfoProbe {
    pub fn new(temperature_sensors: Vec<String>) -> Self {
        Self {
            sys: System::new_all(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            users: Users::new_with_refreshed_list(),
            temperature_sensors,
            cpu_primed: false,
        }
    }

    fn refresh_cpu(&mut self) {
        self.sys.refresh_cpu_all();
        if !self.cpu_primed {
            // the first reading needs two refreshes to compute a usage delta
            std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
            self.sys.refresh_cpu_all();
            self.cpu_primed = true;
        }
    }

    fn cpu_temperature(&mut self) -> Option<f64> {
        self.components.refresh(true);
        let readings: Vec<SensorReading> = self
            .components
            .iter()
            .map(|c| SensorReading {
                label: c.label().to_string(),
                temperature: c.temperature(),
            })
            .collect();
        trace!("read {} temperature sensors", readings.len());
        select_cpu_temperature(&self.temperature_sensors, &readings)
    }

    fn partition(disk: &sysinfo::Disk) -> PartitionSample {
        let total = disk.total_space();
        let free = disk.available_space();
        let used = total.saturating_sub(free);
        PartitionSample {
            device: disk.name().to_string_lossy().to_string(),
            mount_point: disk.mount_point().to_string_lossy().to_string(),
            total,
            used,
            free,
            percent: percent(used, total),
        }
    }

    /// Fallback when `/proc/diskstats` is unreadable: byte totals only
    fn sysinfo_io_counters(&self) -> Option<IoCounters> {
        if self.disks.list().is_empty() {
            return None;
        }

        let (read_bytes, write_bytes) = self.disks.iter().fold((0, 0), |(r, w), disk| {
            let usage = disk.usage();
            (r + usage.total_read_bytes, w + usage.total_written_bytes)
        });

        Some(IoCounters {
            read_bytes,
            write_bytes,
            read_count: None,
            write_count: None,
        })
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl HostProbe for SysinfoProbe {
    fn sample_system(&mut self) -> anyhow::Result<HostSample> {
        self.refresh_cpu();
        self.sys.refresh_memory();
        self.disks.refresh(true);

        let cpu_percent = f64::from(self.sys.global_cpu_usage());
        let cpu_freq = self
            .sys
            .cpus()
            .first()
            .map(|cpu| cpu.frequency())
            .filter(|freq| *freq > 0)
            .map(|freq| freq as f64);

        let memory_total = self.sys.total_memory();
        let memory_used = self.sys.used_memory();
        let memory_available = self.sys.available_memory();
        let memory_percent = percent(memory_total.saturating_sub(memory_available), memory_total);

        let root = self
            .disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .map(Self::partition);

        let io = read_io_counters().or_else(|| self.sysinfo_io_counters());
        let cpu_temp_c = self.cpu_temperature();

        debug!(cpu_percent, memory_percent, "sampled host");

        Ok(HostSample {
            cpu_percent,
            cpu_freq,
            cpu_temp_c,
            memory_total,
            memory_used,
            memory_available,
            memory_percent,
            root_partition: root,
            io,
        })
    }

    fn sample_network(&mut self) -> anyhow::Result<NetworkSample> {
        self.networks.refresh(true);

        let mut sample = NetworkSample::default();
        for (_, data) in self.networks.iter() {
            sample.bytes_sent += data.total_transmitted();
            sample.bytes_recv += data.total_received();
            sample.packets_sent += data.total_packets_transmitted();
            sample.packets_recv += data.total_packets_received();
        }
        sample.connections = read_connection_counts();

        Ok(sample)
    }

    fn sample_processes(&mut self, limit: usize) -> anyhow::Result<Vec<ProcessSample>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        self.users.refresh();
        let total_memory = self.sys.total_memory();

        let mut processes: Vec<ProcessSample> = self
            .sys
            .processes()
            .values()
            .map(|process| ProcessSample {
                pid: process.pid().as_u32(),
                name: process.name().to_string_lossy().to_string(),
                username: process
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|user| user.name().to_string()),
                cpu_percent: Some(f64::from(process.cpu_usage())),
                memory_percent: Some(percent(process.memory(), total_memory)),
                status: Some(process.status().to_string()),
            })
            .collect();

        processes.sort_by(|a, b| {
            b.cpu_percent
                .unwrap_or(0.0)
                .total_cmp(&a.cpu_percent.unwrap_or(0.0))
        });
        processes.truncate(limit);

        Ok(processes)
    }

    fn sample_partitions(&mut self) -> anyhow::Result<Vec<PartitionSample>> {
        self.disks.refresh(true);
        Ok(self.disks.iter().map(Self::partition).collect())
    }
}
