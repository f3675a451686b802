//! End-to-end alert evaluation against the in-memory store
//!
//! These tests verify that:
//! - A breach produces exactly one history row with per-channel flags
//! - Values inside the threshold produce nothing
//! - Unconfigured channels never break evaluation
//! - Overlapping evaluation passes cannot double-record an alert
//! - Test notifications leave the history untouched

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use system_monitor::alerts::AlertEvaluator;
use system_monitor::notify::Dispatcher;
use system_monitor::storage::StorageBackend;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{create_rule, system_metric, test_config, test_env, test_env_with};

#[tokio::test]
async fn test_cpu_breach_sends_email_and_records_alert() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |_| {}).await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 95.0, now))
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    let report = evaluator.check_and_notify_alerts_at(now).await;
    assert_eq!(report.alerts_created, 1);

    let history = env.storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].metric_value, 95.0);
    assert_eq!(history[0].server_id, env.server.id);
    assert!(history[0].message.contains("95.00"));
    assert!(history[0].email_sent);
    assert!(!history[0].sms_sent);
    assert!(!history[0].slack_sent);

    let sent = env.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@example.com");
    assert_eq!(sent[0].subject, "System Monitor Alert: High CPU");
}

#[tokio::test]
async fn test_value_below_threshold_records_nothing() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |_| {}).await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 85.0, now))
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    evaluator.check_and_notify_alerts_at(now).await;

    assert!(env.storage.alerts_for_rule(rule.id).await.unwrap().is_empty());
    assert!(env.transport.sent().is_empty());
}

#[tokio::test]
async fn test_unconfigured_slack_still_records_alert() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |rule| {
        rule.notify_slack = true;
    })
    .await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 95.0, now))
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    evaluator.check_and_notify_alerts_at(now).await;

    let history = env.storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].email_sent);
    assert!(!history[0].slack_sent);
}

#[tokio::test]
async fn test_slack_webhook_receives_alert() {
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/T000/B000"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&slack)
        .await;

    let mut config = test_config();
    config.slack.webhook_url = Some(format!("{}/services/T000/B000", slack.uri()));
    let env = test_env_with(&config).await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |rule| {
        rule.notify_email = false;
        rule.notify_slack = true;
    })
    .await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 99.5, now))
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    evaluator.check_and_notify_alerts_at(now).await;

    let history = env.storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].slack_sent);
    assert!(!history[0].email_sent);
    assert!(env.transport.sent().is_empty());
}

#[tokio::test]
async fn test_overlapping_passes_record_one_alert() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">=", 90.0, |_| {}).await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 90.0, now))
        .await
        .unwrap();

    // two independent evaluators stand in for two engine processes
    let first = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    let second = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());

    let (a, b, c) = tokio::join!(
        first.check_and_notify_alerts_at(now),
        first.check_and_notify_alerts_at(now),
        second.check_and_notify_alerts_at(now),
    );

    assert_eq!(a.alerts_created + b.alerts_created + c.alerts_created, 1);
    assert_eq!(env.storage.alerts_for_rule(rule.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_window_expiry_allows_next_alert() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |rule| {
        rule.duration = 300;
    })
    .await;
    let start = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 97.0, start))
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    for offset in [0, 60, 120, 299] {
        evaluator
            .check_and_notify_alerts_at(start + Duration::seconds(offset))
            .await;
    }
    assert_eq!(env.storage.alerts_for_rule(rule.id).await.unwrap().len(), 1);

    evaluator
        .check_and_notify_alerts_at(start + Duration::seconds(301))
        .await;
    assert_eq!(env.storage.alerts_for_rule(rule.id).await.unwrap().len(), 2);
    assert_eq!(env.transport.sent().len(), 2);
}

#[tokio::test]
async fn test_rule_scoped_to_one_server() {
    let env = test_env().await;
    let other = env
        .storage
        .insert_server(crate::helpers::remote_server("10.0.0.2:51243".to_string()))
        .await
        .unwrap();
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 50.0, |rule| {
        rule.server_id = Some(other.id);
    })
    .await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 99.0, now))
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());
    evaluator.check_and_notify_alerts_at(now).await;
    assert!(env.storage.alerts_for_rule(rule.id).await.unwrap().is_empty());

    env.storage
        .record_system_metric(system_metric(other.id, 99.0, now))
        .await
        .unwrap();
    evaluator.check_and_notify_alerts_at(now).await;

    let history = env.storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].server_id, other.id);
}

#[tokio::test]
async fn test_notification_test_leaves_window_untouched() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "cpu", ">", 90.0, |_| {}).await;
    let evaluator = AlertEvaluator::new(env.storage.clone(), env.dispatcher.clone());

    for _ in 0..3 {
        let (success, message) = evaluator.test_alert_notification(rule.id, "email").await;
        assert!(success);
        assert_eq!(message, "Email sent successfully");
    }
    assert_eq!(
        evaluator.test_alert_notification(rule.id, "sms").await,
        (false, "Failed to send SMS".to_string())
    );
    assert!(env.storage.alerts_for_rule(rule.id).await.unwrap().is_empty());

    // a real breach right afterwards is not suppressed
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 95.0, now))
        .await
        .unwrap();
    let report = evaluator.check_and_notify_alerts_at(now).await;
    assert_eq!(report.alerts_created, 1);
    assert_eq!(env.transport.sent().len(), 4);
}

#[tokio::test]
async fn test_dispatcher_without_mail_server_reports_not_sent() {
    let env = test_env().await;
    let rule = create_rule(env.storage.as_ref(), "memory", ">", 10.0, |_| {}).await;
    let now = Utc::now();
    env.storage
        .record_system_metric(system_metric(env.server.id, 1.0, now))
        .await
        .unwrap();

    let dispatcher = Arc::new(Dispatcher::from_config(&test_config()));
    let evaluator = AlertEvaluator::new(env.storage.clone(), dispatcher);
    evaluator.check_and_notify_alerts_at(now).await;

    let history = env.storage.alerts_for_rule(rule.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].email_sent);
}
