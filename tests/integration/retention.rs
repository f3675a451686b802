//! Integration tests for the retention sweeper

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use system_monitor::retention::RetentionSweeper;
use system_monitor::storage::{NewAlertHistory, QueryRange, StorageBackend};

use crate::helpers::{create_rule, system_metric, test_env};

#[tokio::test]
async fn test_sweep_respects_both_retention_periods() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |_| {}).await;
    let now = Utc::now();

    for days in [40, 31, 10, 0] {
        env.storage
            .record_system_metric(system_metric(env.server.id, 10.0, now - Duration::days(days)))
            .await
            .unwrap();
    }
    for days in [120, 60] {
        let triggered_at = now - Duration::days(days);
        env.storage
            .insert_alert_if_quiet(
                NewAlertHistory {
                    rule_id: rule.id,
                    server_id: env.server.id,
                    triggered_at,
                    metric_value: 95.0,
                    message: "old".to_string(),
                    email_sent: false,
                    sms_sent: false,
                    slack_sent: false,
                },
                triggered_at,
            )
            .await
            .unwrap();
    }

    let sweeper = RetentionSweeper::new(env.storage.clone(), 30, 90);
    let report = sweeper.sweep_at(now).await.unwrap();

    assert_eq!(report.system_metrics, 2);
    assert_eq!(report.alert_history, 1);

    let remaining = env
        .storage
        .query_system_metrics(QueryRange {
            server_id: env.server.id,
            start: now - Duration::days(365),
            end: now,
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|m| m.timestamp > now - Duration::days(30)));

    let alerts = env.storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].triggered_at, now - Duration::days(60));

    // a second sweep finds nothing left to delete
    let report = RetentionSweeper::new(env.storage.clone(), 30, 90)
        .sweep_at(now)
        .await
        .unwrap();
    assert_eq!(report.total(), 0);
}
