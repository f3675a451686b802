use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::{DeliveryOutcome, Notification};

const SLACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Fallback text for notifications and clients without block support
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: Text,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Text>,
    },
    Context {
        elements: Vec<Text>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Text {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl Text {
    pub fn plain(text: impl ToString) -> Self {
        Text::PlainText {
            text: text.to_string(),
        }
    }

    pub fn mrkdwn(text: impl ToString) -> Self {
        Text::Mrkdwn {
            text: text.to_string(),
        }
    }
}

pub struct MessageBuilder {
    text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(text: impl ToString) -> Self {
        Self {
            text: text.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn header(mut self, text: impl ToString) -> Self {
        self.blocks.push(Block::Header {
            text: Text::plain(text),
        });
        self
    }

    /// Section rendered as a two column grid of `*label:*\nvalue` pairs
    pub fn fields<L: ToString, V: ToString>(mut self, fields: Vec<(L, V)>) -> Self {
        self.blocks.push(Block::Section {
            text: None,
            fields: fields
                .into_iter()
                .map(|(label, value)| {
                    Text::mrkdwn(format!("*{}:*\n{}", label.to_string(), value.to_string()))
                })
                .collect(),
        });
        self
    }

    pub fn section(mut self, text: impl ToString) -> Self {
        self.blocks.push(Block::Section {
            text: Some(Text::mrkdwn(text)),
            fields: Vec::new(),
        });
        self
    }

    pub fn context(mut self, text: impl ToString) -> Self {
        self.blocks.push(Block::Context {
            elements: vec![Text::mrkdwn(text)],
        });
        self
    }

    pub fn build(self) -> Message {
        Message {
            text: self.text,
            blocks: self.blocks,
        }
    }
}

pub fn build_alert_message(notification: &Notification<'_>) -> Message {
    let rule = notification.rule;

    MessageBuilder::new(format!("🚨 System Monitor Alert: {}", rule.name))
        .header(format!("🚨 {}", rule.name))
        .fields(vec![
            ("Server", notification.server.name.clone()),
            ("Metric", rule.metric_type.clone()),
            ("Current Value", format!("{:.2}", notification.value)),
            ("Threshold", notification.threshold_display()),
        ])
        .section(format!("*Message:* {}", notification.message))
        .context(format!(
            "Triggered at {}",
            notification.triggered_at_display()
        ))
        .build()
}

pub struct SlackChannel {
    client: Client,
    webhook_url: Option<String>,
}

impl SlackChannel {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    #[instrument(skip_all, fields(rule = %notification.rule.name))]
    pub async fn send(&self, notification: &Notification<'_>) -> DeliveryOutcome {
        let Some(url) = &self.webhook_url else {
            warn!("Slack webhook URL not configured");
            return DeliveryOutcome::NotConfigured("Slack webhook URL not configured".to_string());
        };

        let message = build_alert_message(notification);

        match self
            .client
            .post(url)
            .json(&message)
            .timeout(SLACK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Successfully sent Slack message");
                DeliveryOutcome::Sent
            }
            Ok(response) => {
                let status = response.status();
                error!("Slack webhook failed with status {}", status);
                if let Ok(error_text) = response.text().await {
                    error!("Slack API error response: {}", error_text);
                }
                DeliveryOutcome::Failed(format!("Slack webhook returned status {status}"))
            }
            Err(e) => {
                error!("Error sending Slack alert: {}", e);
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}
