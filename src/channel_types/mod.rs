//! Channel types: the pluggable families of delivery endpoints.
//!
//! Each type bundles its metadata, a config validator that parses the
//! free-form channel config into typed settings, and a factory for the
//! [`Transport`] that actually delivers rendered content.

pub mod email;
pub mod registry;
pub mod schema;
pub mod slack;
pub mod sms;

pub use registry::ChannelTypeRegistry;
pub use schema::{ConfigSchema, FieldKind, FieldSchema};

use crate::config::TransportConfig;
use crate::domain::{ChannelConfig, ConfigValue, Recipient};
use crate::transport::{ConfigError, SendContext, Transport, TransportError};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("channel type '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("invalid channel type definition: {0}")]
    InvalidArgument(String),
    #[error("channel type '{0}' is not registered")]
    NotFound(String),
}

pub trait ChannelTypeDefinition: Send + Sync + fmt::Debug {
    /// Registry key, e.g. `"email"`.
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    /// # Errors
    /// Returns the first offending field.
    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError>;

    fn config_schema(&self) -> ConfigSchema;

    /// Builds a transport whose every operation is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns a permanent `TransportError` if the underlying client cannot be built.
    fn create_transport(&self, timeout: Duration) -> Result<Box<dyn Transport>, TransportError>;

    /// Checks one recipient's type tag and target against this channel type.
    ///
    /// # Errors
    /// Returns `ConfigError` naming the recipient field at fault.
    fn validate_recipient(&self, _recipient: &Recipient) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Copy of `config` that is safe to show to operators.
    fn redact_config(&self, config: &ChannelConfig) -> ChannelConfig {
        redact_secrets(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinChannelType {
    Email,
    Slack,
    Sms,
}

impl BuiltinChannelType {
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Email, Self::Slack, Self::Sms]
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Sms => "sms",
        }
    }

    /// Builds the definition for this type from the process transport settings.
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidArgument` if a shared HTTP client cannot be built.
    pub fn definition(self, config: &TransportConfig) -> Result<Arc<dyn ChannelTypeDefinition>, RegistryError> {
        Ok(match self {
            Self::Email => Arc::new(email::EmailChannelType::new(config.smtp.clone())),
            Self::Slack => Arc::new(slack::SlackChannelType::new(&config.http)?),
            Self::Sms => Arc::new(sms::SmsChannelType::new(config.sms.clone(), &config.http)?),
        })
    }
}

impl fmt::Display for BuiltinChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinChannelType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all().into_iter().find(|t| t.as_str() == s).ok_or_else(|| RegistryError::NotFound(s.to_string()))
    }
}

const SENSITIVE_KEYS: [&str; 7] = ["password", "passwd", "token", "secret", "api_key", "apikey", "credentials"];

pub(crate) fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Replaces the values of secret-looking keys with `***`.
#[must_use]
pub fn redact_secrets(config: &ChannelConfig) -> ChannelConfig {
    config
        .iter()
        .map(|(k, v)| {
            let value = if is_sensitive_key(k) { ConfigValue::from("***") } else { v.clone() };
            (k.clone(), value)
        })
        .collect()
}

pub(crate) fn required_str<'a>(config: &'a ChannelConfig, field: &str) -> Result<&'a str, ConfigError> {
    match config.get(field) {
        None => Err(ConfigError::missing(field)),
        Some(value) => match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(ConfigError::new(field, "must not be empty")),
            None => Err(ConfigError::new(field, format!("expected string, found {}", value.kind()))),
        },
    }
}

pub(crate) fn optional_str<'a>(config: &'a ChannelConfig, field: &str) -> Result<Option<&'a str>, ConfigError> {
    match config.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ConfigError::new(field, format!("expected string, found {}", value.kind()))),
    }
}

pub(crate) fn optional_bool(config: &ChannelConfig, field: &str) -> Result<Option<bool>, ConfigError> {
    match config.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| ConfigError::new(field, format!("expected boolean, found {}", value.kind()))),
    }
}

pub(crate) fn optional_u64(config: &ChannelConfig, field: &str) -> Result<Option<u64>, ConfigError> {
    match config.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ConfigError::new(field, format!("expected non-negative integer, found {}", value.kind()))),
    }
}

/// Maps an HTTP reply status to a transport error; `None` for 2xx.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> Option<TransportError> {
    if status.is_success() {
        return None;
    }
    let details = if body.is_empty() { format!("HTTP {status}") } else { format!("HTTP {status}: {body}") };
    let code = status.as_u16().to_string();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Some(TransportError::transient(code, details))
    } else {
        Some(TransportError::permanent(code, details))
    }
}

/// Maps a reqwest failure to a transport error. A timed-out HTTP call is
/// transient; only the engine's own deadline reports `TIMEOUT`.
pub(crate) fn classify_reqwest(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::transient("io_timeout", e.to_string())
    } else if e.is_connect() || e.is_request() {
        TransportError::transient("connection", e.to_string())
    } else if let Some(status) = e.status() {
        classify_status(status, "").unwrap_or_else(|| TransportError::permanent("http", e.to_string()))
    } else {
        TransportError::permanent("http", e.to_string())
    }
}

/// Sends to each recipient in order and stops at the first failure.
///
/// Once any recipient has been reached, a transient failure is reported as
/// permanent so a retry never repeats a delivery.
pub(crate) async fn deliver_each<'a, F, Fut>(
    ctx: &SendContext,
    recipients: &'a [Recipient],
    mut send_one: F,
) -> Result<(), TransportError>
where
    F: FnMut(&'a Recipient) -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    for (delivered, recipient) in recipients.iter().enumerate() {
        if ctx.is_cancelled() {
            return Err(TransportError::cancelled());
        }
        if let Err(e) = send_one(recipient).await {
            if delivered > 0 && e.is_transient() {
                return Err(TransportError::permanent(
                    e.code,
                    format!("{} ({delivered} of {} recipients already delivered)", e.details, recipients.len()),
                ));
            }
            return Err(e);
        }
    }
    Ok(())
}

pub(crate) fn http_client(config: &crate::config::HttpTransportConfig) -> Result<reqwest::Client, RegistryError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| RegistryError::InvalidArgument(format!("http client: {e}")))
}
