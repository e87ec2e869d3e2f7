//! Notification boundary.
//!
//! The dispatcher hands fully-formed messages to a [`Notifier`]; delivery
//! is best-effort and failures never propagate back into the monitoring
//! loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::config::NotifierConfig;

/// Alert severity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Structured fields accompanying every notification.
#[derive(Debug, Clone, Serialize)]
pub struct AlertFields {
    pub service: String,
    pub incident_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// Boundary for outbound notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message. Returns whether delivery succeeded; must not
    /// fail in any other way.
    async fn send(&self, severity: Severity, message: &str, fields: &AlertFields) -> bool;
}

/// Posts Slack-compatible webhook payloads.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    mention_channel: bool,
    enabled: bool,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig, client: reqwest::Client) -> Self {
        let enabled = config.enabled && config.webhook_url.is_some();
        if config.enabled && config.webhook_url.is_none() {
            tracing::warn!("notifier enabled but no webhook url configured, disabling");
        }
        Self {
            client,
            webhook_url: config.webhook_url.clone(),
            mention_channel: config.mention_channel,
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn payload(&self, severity: Severity, message: &str, fields: &AlertFields) -> serde_json::Value {
        let emoji = match severity {
            Severity::Critical => "🚨",
            Severity::Warning => "⚠️",
            Severity::Info => "✅",
        };
        let mention = if severity == Severity::Critical && self.mention_channel {
            "<!channel> "
        } else {
            ""
        };

        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": format!("{} {}", emoji, message), "emoji": true }
            }),
            json!({
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Service:*\n{}", fields.service) },
                    { "type": "mrkdwn", "text": format!("*Severity:*\n{}", severity.as_str().to_uppercase()) },
                    { "type": "mrkdwn", "text": format!("*Time:*\n{}", fields.timestamp.format("%Y-%m-%d %H:%M:%S")) },
                    { "type": "mrkdwn", "text": format!("*Incident ID:*\n`{}`", fields.incident_id.as_deref().unwrap_or("-")) },
                ]
            }),
        ];

        if !fields.details.is_empty() {
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": fields.details }
            }));
        }

        json!({
            "text": format!("{} {}{}", emoji, mention, message),
            "blocks": blocks,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, severity: Severity, message: &str, fields: &AlertFields) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(url) = &self.webhook_url else {
            return false;
        };

        let payload = self.payload(severity, message, fields);
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("webhook rejected notification: HTTP {}", response.status());
                false
            }
            Err(e) => {
                tracing::warn!("failed to send webhook notification: {}", e);
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AlertFields {
        AlertFields {
            service: "api".to_string(),
            incident_id: Some("api_20250101_120000".to_string()),
            timestamp: Utc::now(),
            details: "*URL:* http://localhost/health".to_string(),
        }
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let config = NotifierConfig {
            enabled: false,
            webhook_url: Some("http://localhost:1/hook".to_string()),
            mention_channel: true,
        };
        let notifier = WebhookNotifier::new(&config, reqwest::Client::new());
        assert!(!notifier.enabled());
        assert!(!notifier.send(Severity::Critical, "api is DOWN", &fields()).await);
    }

    #[tokio::test]
    async fn enabled_without_url_is_disabled() {
        let config = NotifierConfig {
            enabled: true,
            webhook_url: None,
            mention_channel: true,
        };
        let notifier = WebhookNotifier::new(&config, reqwest::Client::new());
        assert!(!notifier.enabled());
    }

    #[test]
    fn critical_payload_mentions_channel() {
        let config = NotifierConfig {
            enabled: true,
            webhook_url: Some("http://localhost/hook".to_string()),
            mention_channel: true,
        };
        let notifier = WebhookNotifier::new(&config, reqwest::Client::new());

        let payload = notifier.payload(Severity::Critical, "api is DOWN", &fields());
        let text = payload["text"].as_str().unwrap();
        assert!(text.contains("<!channel>"));

        let payload = notifier.payload(Severity::Warning, "api is DOWN", &fields());
        assert!(!payload["text"].as_str().unwrap().contains("<!channel>"));
    }

    #[test]
    fn mention_can_be_disabled() {
        let config = NotifierConfig {
            enabled: true,
            webhook_url: Some("http://localhost/hook".to_string()),
            mention_channel: false,
        };
        let notifier = WebhookNotifier::new(&config, reqwest::Client::new());
        let payload = notifier.payload(Severity::Critical, "api is DOWN", &fields());
        assert!(!payload["text"].as_str().unwrap().contains("<!channel>"));
    }
}
