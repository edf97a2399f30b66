use super::{
    ChannelTypeDefinition, ConfigSchema, FieldKind, FieldSchema, RegistryError, classify_reqwest, classify_status,
    deliver_each, http_client, optional_u64, required_str,
};
use crate::config::{HttpTransportConfig, SmsConfig};
use crate::domain::{Channel, ChannelConfig, Recipient, RenderedContent};
use crate::transport::{ConfigError, SendContext, Transport, TransportError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

pub const NAME: &str = "sms";
pub const DEFAULT_MAX_LENGTH: usize = 160;
pub const MAX_LENGTH_LIMIT: usize = 1600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsSettings {
    pub sender_id: String,
    pub max_length: usize,
}

impl SmsSettings {
    /// # Errors
    /// Returns the first field that is missing or malformed.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        let sender_id = required_str(config, "sender_id")?.to_string();
        let max_length = match optional_u64(config, "max_length")? {
            None => DEFAULT_MAX_LENGTH,
            Some(n) => usize::try_from(n)
                .ok()
                .filter(|n| (1..=MAX_LENGTH_LIMIT).contains(n))
                .ok_or_else(|| ConfigError::new("max_length", format!("must be between 1 and {MAX_LENGTH_LIMIT}")))?,
        };
        Ok(Self { sender_id, max_length })
    }
}

/// `+` followed by 8 to 15 digits.
#[must_use]
pub fn is_e164(target: &str) -> bool {
    target
        .strip_prefix('+')
        .is_some_and(|digits| (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Joins subject and body and cuts the result to `max_length` characters.
#[must_use]
pub fn sms_text(content: &RenderedContent, max_length: usize) -> String {
    let text = if content.subject.is_empty() {
        content.body.clone()
    } else {
        format!("{}: {}", content.subject, content.body)
    };
    if text.chars().count() <= max_length {
        return text;
    }
    text.chars().take(max_length).collect()
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    from: &'a str,
    to: &'a str,
    message: &'a str,
}

#[derive(Debug, Clone)]
pub struct SmsChannelType {
    gateway: SmsConfig,
    client: reqwest::Client,
}

impl SmsChannelType {
    /// # Errors
    /// Returns `RegistryError::InvalidArgument` if the HTTP client cannot be built.
    pub fn new(gateway: SmsConfig, http: &HttpTransportConfig) -> Result<Self, RegistryError> {
        Ok(Self { gateway, client: http_client(http)? })
    }
}

impl ChannelTypeDefinition for SmsChannelType {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "SMS"
    }

    fn description(&self) -> &str {
        "Sends text messages to E.164 phone numbers through the configured gateway"
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        SmsSettings::from_config(config).map(|_| ())
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            fields: vec![
                FieldSchema::required("sender_id", FieldKind::String, "Sender shown on the handset"),
                FieldSchema::optional("max_length", FieldKind::Integer, "Longest text sent, 1 to 1600 characters")
                    .with_default(DEFAULT_MAX_LENGTH),
            ],
            recipient_types: vec!["to"],
        }
    }

    fn create_transport(&self, timeout: Duration) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SmsTransport {
            client: self.client.clone(),
            gateway_url: self.gateway.gateway_url.clone(),
            api_key: self.gateway.api_key.clone(),
            timeout,
        }))
    }

    fn validate_recipient(&self, recipient: &Recipient) -> Result<(), ConfigError> {
        if is_e164(&recipient.target) {
            Ok(())
        } else {
            Err(ConfigError::new(
                "recipients.target",
                format!("'{}' is not an E.164 phone number", recipient.target),
            ))
        }
    }
}

#[derive(Debug)]
pub struct SmsTransport {
    client: reqwest::Client,
    gateway_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl SmsTransport {
    async fn post(&self, sender_id: &str, text: &str, recipient: &Recipient) -> Result<(), TransportError> {
        let mut request = self.client.post(&self.gateway_url).timeout(self.timeout).json(&GatewayRequest {
            from: sender_id,
            to: &recipient.target,
            message: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify_reqwest(&e))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if let Some(err) = classify_status(status, body.trim()) {
            tracing::warn!(status = %status, "sms gateway rejected message");
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SmsTransport {
    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        content: &RenderedContent,
    ) -> Result<(), TransportError> {
        let settings = SmsSettings::from_config(&channel.config)
            .map_err(|e| TransportError::permanent("invalid_config", e.to_string()))?;
        let text = sms_text(content, settings.max_length);
        let sender_id = settings.sender_id.as_str();
        let text = text.as_str();

        deliver_each(ctx, &channel.recipients, |recipient| self.post(sender_id, text, recipient)).await
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        SmsSettings::from_config(config).map(|_| ())
    }

    fn type_name(&self) -> &str {
        NAME
    }
}
