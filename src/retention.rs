use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::storage::{StorageBackend, SweepReport};

fn cutoff(now: DateTime<Utc>, days: u32) -> anyhow::Result<DateTime<Utc>> {
    Duration::try_days(i64::from(days))
        .and_then(|retention| now.checked_sub_signed(retention))
        .with_context(|| format!("retention period of {days} days is out of range"))
}

/// Deletes metric samples and alert history past their retention
pub struct RetentionSweeper {
    storage: Arc<dyn StorageBackend>,
    data_retention_days: u32,
    alert_retention_days: u32,
}

impl RetentionSweeper {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        data_retention_days: u32,
        alert_retention_days: u32,
    ) -> Self {
        Self {
            storage,
            data_retention_days,
            alert_retention_days,
        }
    }

    /// Oldest timestamps kept for metrics and for alert history
    pub fn cutoffs(&self, now: DateTime<Utc>) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            cutoff(now, self.data_retention_days)?,
            cutoff(now, self.alert_retention_days)?,
        ))
    }

    pub async fn sweep(&self) -> anyhow::Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Remove every row strictly older than its cutoff, in one transaction
    #[instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let (metrics_before, alerts_before) = self.cutoffs(now)?;

        let report = self
            .storage
            .purge_older_than(metrics_before, alerts_before)
            .await
            .context("retention sweep failed")?;

        info!(
            system = report.system_metrics,
            network = report.network_metrics,
            processes = report.process_snapshots,
            alerts = report.alert_history,
            "cleaned up old data"
        );
        Ok(report)
    }
}
