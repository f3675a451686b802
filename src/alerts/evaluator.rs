use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::rule::{Comparison, MetricKind, MetricSource};
use crate::notify::{Channel, Dispatcher, Notification};
use crate::storage::{
    AlertDelivery, AlertHistory, AlertRule, NewAlertHistory, Server, StorageBackend,
};

/// `(success, human readable message)`
pub type TestNotificationResult = (bool, String);

type PairLock = Arc<tokio::sync::Mutex<()>>;

/// Summary of one evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub rules_checked: usize,
    pub breaches: usize,
    pub alerts_created: usize,
    pub suppressed: usize,
    pub failed_rules: usize,
}

pub fn alert_message(rule: &AlertRule, value: f64) -> String {
    format!(
        "Alert: {} - {} is {:.2} (threshold: {} {:?})",
        rule.name, rule.metric_type, value, rule.comparison, rule.threshold
    )
}

enum PairOutcome {
    NoBreach,
    Suppressed,
    Created,
}

pub struct AlertEvaluator {
    storage: Arc<dyn StorageBackend>,
    dispatcher: Arc<Dispatcher>,
    locks: Mutex<HashMap<(i64, i64), PairLock>>,
}

impl AlertEvaluator {
    pub fn new(storage: Arc<dyn StorageBackend>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            storage,
            dispatcher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check_and_notify_alerts(&self) -> EvaluationReport {
        self.check_and_notify_alerts_at(Utc::now()).await
    }

    /// Evaluate every active rule as of `now`
    ///
    /// A failing rule is logged and counted; the remaining rules are still
    /// evaluated.
    #[instrument(skip(self))]
    pub async fn check_and_notify_alerts_at(&self, now: DateTime<Utc>) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        let rules = match self.storage.active_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!("Error loading alert rules: {e}");
                return report;
            }
        };

        for rule in rules {
            report.rules_checked += 1;
            if let Err(e) = self.evaluate_rule(&rule, now, &mut report).await {
                report.failed_rules += 1;
                error!("Error checking alert rule {}: {e:#}", rule.id);
            }
        }

        self.prune_locks();
        debug!(?report, "alert evaluation pass complete");
        report
    }

    /// Drop pair locks nobody holds; entries of deleted rules or servers
    /// would otherwise accumulate
    fn prune_locks(&self) {
        match self.locks.lock() {
            Ok(mut locks) => locks.retain(|_, lock| Arc::strong_count(lock) > 1),
            Err(_) => warn!("alert lock table poisoned, not pruned"),
        }
    }

    async fn target_servers(&self, rule: &AlertRule) -> anyhow::Result<Vec<Server>> {
        match rule.server_id {
            Some(id) => Ok(self
                .storage
                .server(id)
                .await
                .with_context(|| format!("failed to load server {id}"))?
                .into_iter()
                .collect()),
            None => self
                .storage
                .active_servers()
                .await
                .context("failed to load active servers"),
        }
    }

    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
        report: &mut EvaluationReport,
    ) -> anyhow::Result<()> {
        let Some(kind) = MetricKind::parse(&rule.metric_type) else {
            debug!(rule = rule.id, metric = %rule.metric_type, "unknown metric type");
            return Ok(());
        };

        for server in self.target_servers(rule).await? {
            match self.evaluate_pair(rule, kind, &server, now).await? {
                PairOutcome::NoBreach => {}
                PairOutcome::Suppressed => {
                    report.breaches += 1;
                    report.suppressed += 1;
                }
                PairOutcome::Created => {
                    report.breaches += 1;
                    report.alerts_created += 1;
                }
            }
        }
        Ok(())
    }

    async fn latest_value(&self, kind: MetricKind, server_id: i64) -> anyhow::Result<Option<f64>> {
        let value = match kind.source() {
            MetricSource::System => self
                .storage
                .latest_system_metric(server_id)
                .await
                .context("failed to load latest system metric")?
                .and_then(|metric| kind.from_system(&metric)),
            MetricSource::Network => self
                .storage
                .latest_network_metric(server_id)
                .await
                .context("failed to load latest network metric")?
                .and_then(|metric| kind.from_network(&metric)),
        };
        Ok(value)
    }

    fn pair_lock(&self, rule_id: i64, server_id: i64) -> anyhow::Result<PairLock> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| anyhow::anyhow!("alert lock table poisoned"))?;
        Ok(locks.entry((rule_id, server_id)).or_default().clone())
    }

    async fn evaluate_pair(
        &self,
        rule: &AlertRule,
        kind: MetricKind,
        server: &Server,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PairOutcome> {
        // held for the whole check-dispatch-record sequence
        let lock = self.pair_lock(rule.id, server.id)?;
        let _guard = lock.lock().await;

        let Some(value) = self.latest_value(kind, server.id).await? else {
            return Ok(PairOutcome::NoBreach);
        };

        let breached = Comparison::parse(&rule.comparison)
            .is_some_and(|comparison| comparison.holds(value, rule.threshold));
        if !breached {
            return Ok(PairOutcome::NoBreach);
        }

        let quiet_since = now - Duration::seconds(i64::from(rule.duration));
        if self
            .storage
            .has_alert_since(rule.id, server.id, quiet_since)
            .await
            .context("failed to check recent alerts")?
        {
            debug!(rule = rule.id, server = server.id, "alert suppressed by window");
            return Ok(PairOutcome::Suppressed);
        }

        // reserve the history row first: of two racing evaluators only the
        // one whose insert succeeds notifies
        let message = alert_message(rule, value);
        let reserved = NewAlertHistory {
            rule_id: rule.id,
            server_id: server.id,
            triggered_at: now,
            metric_value: value,
            message: message.clone(),
            email_sent: false,
            sms_sent: false,
            slack_sent: false,
        };
        let Some(history) = self
            .storage
            .insert_alert_if_quiet(reserved, quiet_since)
            .await
            .context("failed to record alert")?
        else {
            warn!(
                rule = rule.id,
                server = server.id,
                "alert already recorded by another evaluator"
            );
            return Ok(PairOutcome::Suppressed);
        };

        let notification = Notification {
            rule,
            server,
            value,
            message: &message,
            triggered_at: now,
        };
        let report = self.dispatcher.dispatch(&notification).await;
        let delivery = AlertDelivery {
            email_sent: report.email_sent(),
            sms_sent: report.sms_sent(),
            slack_sent: report.slack_sent(),
        };

        if let Err(e) = self.storage.record_alert_delivery(history.id, delivery).await {
            error!("failed to record delivery of alert {}: {e}", history.id);
        }

        info!(
            alert = history.id,
            rule = %rule.name,
            server = %server.name,
            value,
            "alert triggered"
        );
        Ok(PairOutcome::Created)
    }

    /// Send a synthetic alert for `rule_id` through one channel
    ///
    /// The rule's threshold stands in for the metric value and the local
    /// server for the target. Nothing is written to the alert history.
    #[instrument(skip(self))]
    pub async fn test_alert_notification(
        &self,
        rule_id: i64,
        channel: &str,
    ) -> TestNotificationResult {
        let rule = match self.storage.rule(rule_id).await {
            Ok(Some(rule)) => rule,
            Ok(None) => return (false, "Alert rule not found".to_string()),
            Err(e) => {
                error!("Error loading alert rule {rule_id}: {e}");
                return (false, "Alert rule not found".to_string());
            }
        };

        let server = match self.storage.local_server().await {
            Ok(Some(server)) => server,
            Ok(None) => return (false, "No server found".to_string()),
            Err(e) => {
                error!("Error loading local server: {e}");
                return (false, "No server found".to_string());
            }
        };

        let Ok(channel) = channel.parse::<Channel>() else {
            return (false, "Invalid notification type".to_string());
        };

        let message = format!("Test alert for rule: {}", rule.name);
        let notification = Notification {
            rule: &rule,
            server: &server,
            value: rule.threshold,
            message: &message,
            triggered_at: Utc::now(),
        };

        let sent = self.dispatcher.send(channel, &notification).await.is_sent();
        let text = match (channel, sent) {
            (Channel::Email, true) => "Email sent successfully",
            (Channel::Email, false) => "Failed to send email",
            (Channel::Sms, true) => "SMS sent successfully",
            (Channel::Sms, false) => "Failed to send SMS",
            (Channel::Slack, true) => "Slack message sent successfully",
            (Channel::Slack, false) => "Failed to send Slack message",
        };
        (sent, text.to_string())
    }

    pub async fn acknowledge_alert(&self, alert_id: i64) -> anyhow::Result<bool> {
        self.storage
            .acknowledge_alert(alert_id, Utc::now())
            .await
            .with_context(|| format!("failed to acknowledge alert {alert_id}"))
    }

    /// Alert history of a rule, newest first
    pub async fn history(&self, rule_id: i64) -> anyhow::Result<Vec<AlertHistory>> {
        self.storage
            .alerts_for_rule(rule_id)
            .await
            .with_context(|| format!("failed to load alert history of rule {rule_id}"))
    }
}
