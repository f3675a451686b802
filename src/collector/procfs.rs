//! Linux `/proc` readers for counters `sysinfo` does not expose
//!
//! Both readers return `None` when the files are unavailable (non-Linux
//! hosts, restricted containers) so the corresponding metric columns end up
//! null instead of failing the tick.

use serde::{Deserialize, Serialize};

/// TCP connection counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub established: u32,
    pub listen: u32,
    pub time_wait: u32,
}

/// Cumulative block device I/O counters summed over whole disks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_count: Option<u64>,
    pub write_count: Option<u64>,
}

const TCP_ESTABLISHED: &str = "01";
const TCP_TIME_WAIT: &str = "06";
const TCP_LISTEN: &str = "0A";

const SECTOR_SIZE: u64 = 512;

/// Count connection states in the content of `/proc/net/tcp` or `/proc/net/tcp6`
pub fn count_tcp_states(content: &str, counts: &mut ConnectionCounts) {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        match fields[3] {
            TCP_ESTABLISHED => counts.established += 1,
            TCP_LISTEN => counts.listen += 1,
            TCP_TIME_WAIT => counts.time_wait += 1,
            _ => {}
        }
    }
}

pub fn read_connection_counts() -> Option<ConnectionCounts> {
    let mut counts = ConnectionCounts::default();
    let mut found = false;

    for path in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(content) = std::fs::read_to_string(path) {
            count_tcp_states(&content, &mut counts);
            found = true;
        }
    }

    found.then_some(counts)
}

/// Whole disks are `sda`, `vdb`, `nvme0n1`, `mmcblk0`; partitions are
/// `sda1`, `nvme0n1p2`, `mmcblk0p1`
fn is_whole_disk(device: &str) -> bool {
    if device.starts_with("loop") || device.starts_with("ram") || device.starts_with("dm-") {
        return false;
    }

    if let Some(rest) = device
        .strip_prefix("nvme")
        .or_else(|| device.strip_prefix("mmcblk"))
    {
        return !rest.contains('p');
    }

    !device.ends_with(|c: char| c.is_ascii_digit())
}

/// Sum the counters of whole disks in the content of `/proc/diskstats`
pub fn parse_diskstats(content: &str) -> Option<IoCounters> {
    let mut totals = IoCounters {
        read_count: Some(0),
        write_count: Some(0),
        ..IoCounters::default()
    };
    let mut found = false;

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || !is_whole_disk(fields[2]) {
            continue;
        }

        let field = |i: usize| fields[i].parse::<u64>().unwrap_or(0);

        totals.read_count = totals.read_count.map(|c| c + field(3));
        totals.read_bytes += field(5) * SECTOR_SIZE;
        totals.write_count = totals.write_count.map(|c| c + field(7));
        totals.write_bytes += field(9) * SECTOR_SIZE;
        found = true;
    }

    found.then_some(totals)
}

pub fn read_io_counters() -> Option<IoCounters> {
    std::fs::read_to_string("/proc/diskstats")
        .ok()
        .and_then(|content| parse_diskstats(&content))
}
