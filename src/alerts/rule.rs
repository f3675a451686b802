use std::fmt;

use crate::storage::{NetworkMetric, SystemMetric};

/// Metric an alert rule can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    CpuTemp,
    NetworkSent,
    NetworkRecv,
}

/// Which table holds the latest value of a metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSource {
    System,
    Network,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::CpuTemp,
        MetricKind::NetworkSent,
        MetricKind::NetworkRecv,
    ];

    /// Parse the stored metric type; unknown strings yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cpu" => Some(MetricKind::Cpu),
            "memory" => Some(MetricKind::Memory),
            "disk" => Some(MetricKind::Disk),
            "cpu_temp" => Some(MetricKind::CpuTemp),
            "network_sent" => Some(MetricKind::NetworkSent),
            "network_recv" => Some(MetricKind::NetworkRecv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::CpuTemp => "cpu_temp",
            MetricKind::NetworkSent => "network_sent",
            MetricKind::NetworkRecv => "network_recv",
        }
    }

    pub fn source(&self) -> MetricSource {
        match self {
            MetricKind::Cpu | MetricKind::Memory | MetricKind::Disk | MetricKind::CpuTemp => {
                MetricSource::System
            }
            MetricKind::NetworkSent | MetricKind::NetworkRecv => MetricSource::Network,
        }
    }

    /// Value of this kind in a system sample; `None` for network kinds and
    /// for readings the host did not provide
    pub fn from_system(&self, metric: &SystemMetric) -> Option<f64> {
        match self {
            MetricKind::Cpu => Some(metric.cpu_percent),
            MetricKind::Memory => Some(metric.memory_percent),
            MetricKind::Disk => metric.disk_percent,
            MetricKind::CpuTemp => metric.cpu_temp_c,
            MetricKind::NetworkSent | MetricKind::NetworkRecv => None,
        }
    }

    pub fn from_network(&self, metric: &NetworkMetric) -> Option<f64> {
        match self {
            MetricKind::NetworkSent => Some(metric.bytes_sent as f64),
            MetricKind::NetworkRecv => Some(metric.bytes_recv as f64),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
}

impl Comparison {
    /// Parse the stored operator; anything unrecognised yields `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ">" => Some(Comparison::Greater),
            ">=" => Some(Comparison::GreaterOrEqual),
            "<" => Some(Comparison::Less),
            "<=" => Some(Comparison::LessOrEqual),
            "==" => Some(Comparison::Equal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "==",
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Greater => value > threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::Less => value < threshold,
            Comparison::LessOrEqual => value <= threshold,
            Comparison::Equal => value == threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluate a stored operator string; unknown operators never hold
pub fn evaluate_threshold(value: f64, threshold: f64, comparison: &str) -> bool {
    Comparison::parse(comparison).is_some_and(|op| op.holds(value, threshold))
}
