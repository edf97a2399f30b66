pub mod channel;
pub mod ids;
pub mod message;
pub mod render;
pub mod template;

pub use channel::{Channel, ChannelConfig, CommonSettings, ConfigValue, Recipient, RecipientType, SettingsOverride};
pub use ids::{ChannelId, MessageId, TemplateId};
pub use message::{
    ChannelOverride, ErrorCode, Message, MessageError, MessageResult, MessageStatus, MessageSummary, ResultError,
    ResultOutcome,
};
pub use render::{RenderError, RenderRequest, RenderedContent, TemplateRenderer, Variables};
pub use template::Template;

use thiserror::Error;
use time::OffsetDateTime;

/// An entity invariant was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct DomainError {
    pub field: &'static str,
    pub message: String,
}

impl DomainError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
