//! Email notifications via SMTP
//!
//! Delivery goes through the [`MailTransport`] trait. [`SmtpMailer`] wraps
//! the `lettre` async SMTP transport; [`MemoryTransport`] records messages
//! instead of sending them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, instrument, warn};

use super::{DeliveryOutcome, Notification};
use crate::config::MailConfig;

/// A fully rendered plain text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the SMTP transport; `None` when no mail server is configured
    /// or the server name is not a valid relay
    pub fn from_config(config: &MailConfig) -> Option<Self> {
        let host = config.server.as_deref()?;

        let builder = if config.use_tls {
            match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host) {
                Ok(builder) => builder,
                Err(e) => {
                    error!("invalid SMTP relay {host}: {e}");
                    return None;
                }
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Some(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(email.from.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Transport that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail_with: Option<String>,
}

impl MemoryTransport {
    /// A transport whose every send fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::default(),
            fail_with: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        if let Some(reason) = &self.fail_with {
            anyhow::bail!("{reason}");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mail outbox lock poisoned"))?
            .push(email);
        Ok(())
    }
}

pub struct EmailChannel {
    transport: Option<Arc<dyn MailTransport>>,
    sender: Option<String>,
}

impl EmailChannel {
    pub fn new(transport: Option<Arc<dyn MailTransport>>, sender: Option<String>) -> Self {
        Self { transport, sender }
    }

    pub fn subject(notification: &Notification<'_>) -> String {
        format!("System Monitor Alert: {}", notification.rule.name)
    }

    pub fn body(notification: &Notification<'_>) -> String {
        let rule = notification.rule;
        format!(
            "System Monitor Alert\n\
             \n\
             Server: {server}\n\
             Alert Rule: {name}\n\
             Metric: {metric}\n\
             Current Value: {value:.2}\n\
             Threshold: {threshold}\n\
             \n\
             Message: {message}\n\
             \n\
             Triggered at: {at}\n\
             \n\
             ---\n\
             This is an automated alert from System Monitor.",
            server = notification.server.name,
            name = rule.name,
            metric = rule.metric_type,
            value = notification.value,
            threshold = notification.threshold_display(),
            message = notification.message,
            at = notification.triggered_at_display(),
        )
    }

    #[instrument(skip_all, fields(rule = %notification.rule.name))]
    pub async fn send(&self, notification: &Notification<'_>) -> DeliveryOutcome {
        let Some(transport) = &self.transport else {
            warn!("mail server not configured, skipping email alert");
            return DeliveryOutcome::NotConfigured("mail server not configured".to_string());
        };

        let Some(from) = &self.sender else {
            warn!("no mail sender configured, skipping email alert");
            return DeliveryOutcome::NotConfigured("mail sender not configured".to_string());
        };

        let rule = notification.rule;
        let Some(to) = rule
            .email_address
            .clone()
            .or_else(|| rule.owner_email.clone())
            .filter(|address| !address.trim().is_empty())
        else {
            warn!("no email recipient for alert rule {}", rule.id);
            return DeliveryOutcome::NotConfigured("no email recipient".to_string());
        };

        let email = OutgoingEmail {
            from: from.clone(),
            to: to.clone(),
            subject: Self::subject(notification),
            body: Self::body(notification),
        };

        match transport.send(email).await {
            Ok(()) => {
                info!("sent email alert to {to}");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                error!("Error sending email alert: {e:#}");
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}
