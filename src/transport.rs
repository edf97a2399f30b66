use crate::domain::{Channel, ChannelConfig, RenderedContent};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Worth another attempt: connection resets, 5xx-like replies, i/o timeouts.
    Transient,
    /// The provider rejected the message; retrying will not help.
    Permanent,
    /// The per-transport deadline elapsed.
    Timeout,
    /// The caller cancelled the request.
    Cancelled,
}

impl TransportErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} transport error {code}: {details}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub code: String,
    pub details: String,
}

impl TransportError {
    #[must_use]
    pub fn transient(code: impl Into<String>, details: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Transient, code: code.into(), details: details.into() }
    }

    #[must_use]
    pub fn permanent(code: impl Into<String>, details: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Permanent, code: code.into(), details: details.into() }
    }

    #[must_use]
    pub fn timeout(details: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Timeout, code: "deadline_exceeded".to_string(), details: details.into() }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self { kind: TransportErrorKind::Cancelled, code: "cancelled".to_string(), details: "request cancelled".into() }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Transient)
    }
}

/// A channel's configuration does not satisfy its type's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }

    #[must_use]
    pub fn missing(field: &str) -> Self {
        Self::new(field, "is required")
    }
}

/// Cancellation token plus optional deadline carried through one dispatch.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl SendContext {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel, deadline: None }
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::default().with_deadline(Instant::now() + timeout)
    }

    /// Tightens the deadline; a later deadline than the current one is ignored.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));
        self
    }

    /// A context that is cancelled with this one and expires no later than `timeout` from now.
    #[must_use]
    pub fn child(&self, timeout: Duration) -> Self {
        Self { cancel: self.cancel.child_token(), deadline: self.deadline }.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves when the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Delivers rendered content to a channel's recipients. Implementations are
/// produced by a [`ChannelTypeDefinition`](crate::channel_types::ChannelTypeDefinition).
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `content` to every recipient of `channel`.
    ///
    /// Implementations should return promptly once `ctx` is cancelled.
    ///
    /// # Errors
    /// Returns a categorised `TransportError`; only `Transient` errors are retried.
    async fn send(&self, ctx: &SendContext, channel: &Channel, content: &RenderedContent)
    -> Result<(), TransportError>;

    /// # Errors
    /// Returns the offending field when `config` does not fit this transport.
    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError>;

    fn type_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(TransportError::transient("503", "unavailable").is_transient());
        assert!(!TransportError::permanent("403", "forbidden").is_transient());
        assert!(!TransportError::timeout("slow").is_transient());
        assert!(!TransportError::cancelled().is_transient());
    }

    #[tokio::test]
    async fn test_child_context_takes_the_tighter_deadline() {
        let parent = SendContext::with_timeout(Duration::from_secs(60));
        let child = parent.child(Duration::from_millis(10));
        assert!(child.deadline() < parent.deadline());

        let loose = SendContext::with_timeout(Duration::from_millis(10)).child(Duration::from_secs(60));
        assert!(loose.remaining().unwrap() <= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_cancelling_parent_cancels_child() {
        let parent = SendContext::default();
        let child = parent.child(Duration::from_secs(1));
        parent.cancel();
        assert!(child.is_cancelled());
        child.cancelled().await;
    }

    #[test]
    fn test_context_without_deadline_never_expires() {
        let ctx = SendContext::default();
        assert!(!ctx.is_expired());
        assert_eq!(ctx.remaining(), None);
    }
}
