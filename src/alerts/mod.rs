//! Threshold alerting
//!
//! [`AlertEvaluator`] compares the latest stored sample of every active rule's
//! metric against its threshold, de-duplicates alerts per (rule, server)
//! within the rule's window and hands breaches to the
//! [`Dispatcher`](crate::notify::Dispatcher).

mod evaluator;
pub mod rule;

pub use evaluator::{AlertEvaluator, EvaluationReport, TestNotificationResult, alert_message};
pub use rule::{Comparison, MetricKind, MetricSource, evaluate_threshold};
