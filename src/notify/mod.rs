//! Alert notification channels
//!
//! Every channel is independent: a failure in one never prevents the others
//! from being attempted, and no channel returns an error. Instead each
//! attempt yields a [`DeliveryOutcome`] that the evaluator records per
//! alert.

pub mod email;
pub mod slack;
pub mod sms;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::storage::{AlertRule, Server};

pub use email::{EmailChannel, MailTransport, MemoryTransport, OutgoingEmail, SmtpMailer};
pub use slack::SlackChannel;
pub use sms::SmsChannel;

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// The channel lacks configuration or a recipient
    NotConfigured(String),
    /// The transport was reached but the delivery failed
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Sms,
    Slack,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Slack => "slack",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "slack" => Ok(Channel::Slack),
            other => Err(format!("unknown notification channel: {other}")),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a channel needs to render one alert
#[derive(Debug, Clone)]
pub struct Notification<'a> {
    pub rule: &'a AlertRule,
    pub server: &'a Server,
    pub value: f64,
    pub message: &'a str,
    pub triggered_at: DateTime<Utc>,
}

impl Notification<'_> {
    /// Threshold as shown to humans, e.g. `"> 90.0"`
    pub fn threshold_display(&self) -> String {
        format!("{} {:?}", self.rule.comparison, self.rule.threshold)
    }

    pub fn triggered_at_display(&self) -> String {
        self.triggered_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

/// Per-channel outcomes of one dispatch; `None` means the rule did not
/// enable that channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub email: Option<DeliveryOutcome>,
    pub sms: Option<DeliveryOutcome>,
    pub slack: Option<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn email_sent(&self) -> bool {
        self.email.as_ref().is_some_and(DeliveryOutcome::is_sent)
    }

    pub fn sms_sent(&self) -> bool {
        self.sms.as_ref().is_some_and(DeliveryOutcome::is_sent)
    }

    pub fn slack_sent(&self) -> bool {
        self.slack.as_ref().is_some_and(DeliveryOutcome::is_sent)
    }
}

pub struct Dispatcher {
    email: EmailChannel,
    sms: SmsChannel,
    slack: SlackChannel,
}

impl Dispatcher {
    pub fn new(email: EmailChannel, sms: SmsChannel, slack: SlackChannel) -> Self {
        Self { email, sms, slack }
    }

    /// Build all channels from configuration, with SMTP as mail transport
    pub fn from_config(config: &Config) -> Self {
        let transport = SmtpMailer::from_config(&config.mail)
            .map(|mailer| Arc::new(mailer) as Arc<dyn MailTransport>);

        Self {
            email: EmailChannel::new(transport, config.mail.sender()),
            sms: SmsChannel::new(config.twilio.clone()),
            slack: SlackChannel::new(config.slack.webhook_url.clone()),
        }
    }

    /// Same as `from_config` but with an explicit mail transport
    pub fn with_mail_transport(config: &Config, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            email: EmailChannel::new(Some(transport), config.mail.sender()),
            sms: SmsChannel::new(config.twilio.clone()),
            slack: SlackChannel::new(config.slack.webhook_url.clone()),
        }
    }

    pub async fn send(&self, channel: Channel, notification: &Notification<'_>) -> DeliveryOutcome {
        match channel {
            Channel::Email => self.email.send(notification).await,
            Channel::Sms => self.sms.send(notification).await,
            Channel::Slack => self.slack.send(notification).await,
        }
    }

    /// Send through every channel the rule enables, concurrently
    #[instrument(
        skip_all,
        fields(rule = %notification.rule.name, server = %notification.server.name)
    )]
    pub async fn dispatch(&self, notification: &Notification<'_>) -> DispatchReport {
        let rule = notification.rule;

        let email = async {
            if rule.notify_email {
                Some(self.email.send(notification).await)
            } else {
                None
            }
        };
        let sms = async {
            if rule.notify_sms {
                Some(self.sms.send(notification).await)
            } else {
                None
            }
        };
        let slack = async {
            if rule.notify_slack {
                Some(self.slack.send(notification).await)
            } else {
                None
            }
        };

        let (email, sms, slack) = tokio::join!(email, sms, slack);
        let report = DispatchReport { email, sms, slack };
        debug!(?report, "dispatched notification");
        report
    }
}
