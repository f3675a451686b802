//! Property-based tests for invariants using proptest
//!
//! These tests verify that certain properties hold true for all inputs:
//! - Unknown comparison operators never trigger
//! - Opposite operators partition the number line
//! - Uptime percentages stay within bounds
//! - Alert messages always carry rule name and metric

use proptest::prelude::*;
use system_monitor::alerts::{Comparison, MetricKind, alert_message, evaluate_threshold};
use system_monitor::health::uptime_percentage;
use system_monitor::storage::AlertRule;

fn rule(name: &str, metric_type: &str, comparison: &str, threshold: f64) -> AlertRule {
    AlertRule {
        id: 1,
        user_id: 1,
        server_id: None,
        name: name.to_string(),
        metric_type: metric_type.to_string(),
        comparison: comparison.to_string(),
        threshold,
        duration: 60,
        notify_email: true,
        notify_sms: false,
        notify_slack: false,
        email_address: None,
        phone_number: None,
        is_active: true,
        owner_email: None,
    }
}

// Property: anything other than the five operators is never a breach
proptest! {
    #[test]
    fn prop_unknown_operator_never_triggers(
        op in "[a-z!~<>=]{0,3}",
        value in -1e6f64..1e6f64,
        threshold in -1e6f64..1e6f64,
    ) {
        prop_assume!(Comparison::parse(&op).is_none());
        prop_assert!(!evaluate_threshold(value, threshold, &op));
    }
}

// Property: exactly one of `>` and `<=` holds, same for `<` and `>=`
proptest! {
    #[test]
    fn prop_opposite_operators_are_complements(
        value in -1e6f64..1e6f64,
        threshold in -1e6f64..1e6f64,
    ) {
        prop_assert_ne!(
            evaluate_threshold(value, threshold, ">"),
            evaluate_threshold(value, threshold, "<=")
        );
        prop_assert_ne!(
            evaluate_threshold(value, threshold, "<"),
            evaluate_threshold(value, threshold, ">=")
        );
    }
}

// Property: a value equal to the threshold only satisfies the inclusive operators
proptest! {
    #[test]
    fn prop_equal_value_boundary(threshold in -1e6f64..1e6f64) {
        prop_assert!(!evaluate_threshold(threshold, threshold, ">"));
        prop_assert!(!evaluate_threshold(threshold, threshold, "<"));
        prop_assert!(evaluate_threshold(threshold, threshold, ">="));
        prop_assert!(evaluate_threshold(threshold, threshold, "<="));
        prop_assert!(evaluate_threshold(threshold, threshold, "=="));
    }
}

proptest! {
    #[test]
    fn prop_uptime_is_a_percentage(total in 0u64..10_000, ok_share in 0.0f64..=1.0) {
        let ok = (total as f64 * ok_share) as u64;
        let uptime = uptime_percentage(total, ok);
        prop_assert!((0.0..=100.0).contains(&uptime));
        if ok == total {
            prop_assert_eq!(uptime, 100.0);
        }
    }
}

proptest! {
    #[test]
    fn prop_alert_message_names_rule_and_metric(
        name in "[A-Za-z ]{1,20}",
        kind_index in 0usize..MetricKind::ALL.len(),
        value in 0.0f64..1000.0,
    ) {
        let kind = MetricKind::ALL[kind_index];
        let rule = rule(&name, kind.as_str(), ">", 90.0);
        let message = alert_message(&rule, value);

        let expected_prefix = format!("Alert: {} - {} is ", name, kind.as_str());
        prop_assert!(message.starts_with(&expected_prefix));
        prop_assert!(message.ends_with("(threshold: > 90.0)"));
    }
}
