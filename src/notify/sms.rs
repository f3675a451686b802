use std::time::Duration;

use reqwest::Client;
use tracing::{error, info, instrument, warn};

use super::{DeliveryOutcome, Notification};
use crate::config::TwilioConfig;

/// SMS notifications through the Twilio Messages API
pub struct SmsChannel {
    client: Client,
    config: TwilioConfig,
}

impl SmsChannel {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn text(notification: &Notification<'_>) -> String {
        let rule = notification.rule;
        format!(
            "System Monitor Alert: {} on {}. {}={:.2} (threshold: {}{:?})",
            rule.name,
            notification.server.name,
            rule.metric_type,
            notification.value,
            rule.comparison,
            rule.threshold
        )
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            account_sid
        )
    }

    #[instrument(skip_all, fields(rule = %notification.rule.name))]
    pub async fn send(&self, notification: &Notification<'_>) -> DeliveryOutcome {
        let (Some(account_sid), Some(auth_token), Some(from)) = (
            &self.config.account_sid,
            &self.config.auth_token,
            &self.config.phone_number,
        ) else {
            warn!("Twilio not configured, skipping SMS alert");
            return DeliveryOutcome::NotConfigured("Twilio not configured".to_string());
        };

        let Some(to) = notification
            .rule
            .phone_number
            .as_deref()
            .filter(|number| !number.trim().is_empty())
        else {
            warn!("No phone number configured for alert rule");
            return DeliveryOutcome::NotConfigured(
                "No phone number configured for alert rule".to_string(),
            );
        };

        let body = Self::text(notification);
        let form = [("To", to), ("From", from.as_str()), ("Body", body.as_str())];

        match self
            .client
            .post(self.messages_url(account_sid))
            .basic_auth(account_sid, Some(auth_token))
            .form(&form)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("sent SMS alert to {to}");
                DeliveryOutcome::Sent
            }
            Ok(response) => {
                let status = response.status();
                error!("Twilio request failed with status: {}", status);
                if let Ok(error_text) = response.text().await {
                    error!("Twilio API error response: {}", error_text);
                }
                DeliveryOutcome::Failed(format!("Twilio returned status {status}"))
            }
            Err(e) => {
                error!("Error sending SMS alert: {}", e);
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}
