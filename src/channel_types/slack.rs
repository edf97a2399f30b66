use super::{
    ChannelTypeDefinition, ConfigSchema, FieldKind, FieldSchema, RegistryError, classify_reqwest, classify_status,
    deliver_each, http_client, optional_str, redact_secrets, required_str,
};
use crate::config::HttpTransportConfig;
use crate::domain::{Channel, ChannelConfig, ConfigValue, Recipient, RecipientType, RenderedContent};
use crate::transport::{ConfigError, SendContext, Transport, TransportError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

pub const NAME: &str = "slack";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackSettings {
    pub webhook_url: String,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

impl SlackSettings {
    /// # Errors
    /// Returns the first field that is missing or malformed.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        let webhook_url = required_str(config, "webhook_url")?;
        if !webhook_url.starts_with("https://") {
            return Err(ConfigError::new("webhook_url", "must be an https:// URL"));
        }
        Ok(Self {
            webhook_url: webhook_url.to_string(),
            username: optional_str(config, "username")?.map(str::to_string),
            icon_emoji: optional_str(config, "icon_emoji")?.map(str::to_string),
        })
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<&'a str>,
}

fn message_text(content: &RenderedContent) -> String {
    if content.subject.is_empty() { content.body.clone() } else { format!("*{}*\n{}", content.subject, content.body) }
}

#[derive(Debug, Clone)]
pub struct SlackChannelType {
    client: reqwest::Client,
}

impl SlackChannelType {
    /// # Errors
    /// Returns `RegistryError::InvalidArgument` if the HTTP client cannot be built.
    pub fn new(http: &HttpTransportConfig) -> Result<Self, RegistryError> {
        Ok(Self { client: http_client(http)? })
    }
}

impl ChannelTypeDefinition for SlackChannelType {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Slack"
    }

    fn description(&self) -> &str {
        "Posts messages to Slack channels and users through an incoming webhook"
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        SlackSettings::from_config(config).map(|_| ())
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            fields: vec![
                FieldSchema::required("webhook_url", FieldKind::Url, "Incoming webhook URL (https)"),
                FieldSchema::optional("username", FieldKind::String, "Display name for the bot"),
                FieldSchema::optional("icon_emoji", FieldKind::String, "Emoji used as the bot avatar"),
            ],
            recipient_types: vec!["channel", "user"],
        }
    }

    fn create_transport(&self, timeout: Duration) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SlackTransport { client: self.client.clone(), timeout }))
    }

    fn validate_recipient(&self, recipient: &Recipient) -> Result<(), ConfigError> {
        let prefix = match recipient.recipient_type {
            RecipientType::Channel => '#',
            RecipientType::User => '@',
            other => {
                return Err(ConfigError::new(
                    "recipients.type",
                    format!("'{}' is not valid for slack; use channel or user", other.as_str()),
                ));
            }
        };
        if recipient.target.len() < 2 || !recipient.target.starts_with(prefix) {
            return Err(ConfigError::new(
                "recipients.target",
                format!("'{}' must start with '{prefix}'", recipient.target),
            ));
        }
        Ok(())
    }

    fn redact_config(&self, config: &ChannelConfig) -> ChannelConfig {
        let mut redacted = redact_secrets(config);
        if redacted.get("webhook_url").is_some() {
            redacted = redacted.with("webhook_url", ConfigValue::from("***"));
        }
        redacted
    }
}

#[derive(Debug)]
pub struct SlackTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl SlackTransport {
    async fn post(&self, settings: &SlackSettings, text: &str, recipient: &Recipient) -> Result<(), TransportError> {
        let payload = WebhookPayload {
            channel: &recipient.target,
            text,
            username: settings.username.as_deref(),
            icon_emoji: settings.icon_emoji.as_deref(),
        };
        let response = self
            .client
            .post(&settings.webhook_url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if let Some(err) = classify_status(status, body.trim()) {
            tracing::warn!(target_channel = %recipient.target, status = %status, "slack webhook rejected message");
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SlackTransport {
    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        content: &RenderedContent,
    ) -> Result<(), TransportError> {
        let settings = SlackSettings::from_config(&channel.config)
            .map_err(|e| TransportError::permanent("invalid_config", e.to_string()))?;
        let text = message_text(content);
        let settings = &settings;
        let text = text.as_str();

        deliver_each(ctx, &channel.recipients, |recipient| self.post(settings, text, recipient)).await
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        SlackSettings::from_config(config).map(|_| ())
    }

    fn type_name(&self) -> &str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> SlackChannelType {
        SlackChannelType::new(&HttpTransportConfig::default()).unwrap()
    }

    #[test]
    fn test_webhook_must_be_https() {
        let err = SlackSettings::from_config(&ChannelConfig::new().with("webhook_url", "http://hooks.example.com/x"))
            .unwrap_err();
        assert_eq!(err.field, "webhook_url");
        assert!(SlackSettings::from_config(&ChannelConfig::new()).is_err());

        let ok = SlackSettings::from_config(
            &ChannelConfig::new().with("webhook_url", "https://hooks.example.com/x").with("username", "bot"),
        )
        .unwrap();
        assert_eq!(ok.username.as_deref(), Some("bot"));
    }

    #[test]
    fn test_recipient_prefixes() {
        let def = definition();
        assert!(def.validate_recipient(&Recipient::new("ops", RecipientType::Channel, "#ops")).is_ok());
        assert!(def.validate_recipient(&Recipient::new("ada", RecipientType::User, "@ada")).is_ok());
        assert!(def.validate_recipient(&Recipient::new("ops", RecipientType::Channel, "ops")).is_err());
        assert!(def.validate_recipient(&Recipient::new("ada", RecipientType::User, "#ada")).is_err());
        assert!(def.validate_recipient(&Recipient::new("ada", RecipientType::To, "@ada")).is_err());
    }

    #[test]
    fn test_webhook_url_is_redacted() {
        let config = ChannelConfig::new().with("webhook_url", "https://hooks.example.com/secret").with("username", "bot");
        let redacted = definition().redact_config(&config);
        assert_eq!(redacted.get("webhook_url").and_then(ConfigValue::as_str), Some("***"));
        assert_eq!(redacted.get("username").and_then(ConfigValue::as_str), Some("bot"));
    }

    #[test]
    fn test_message_text_bolds_subject() {
        let with_subject = RenderedContent { subject: "Alert".into(), body: "disk full".into() };
        assert_eq!(message_text(&with_subject), "*Alert*\ndisk full");
        let bare = RenderedContent { subject: String::new(), body: "disk full".into() };
        assert_eq!(message_text(&bare), "disk full");
    }
}
