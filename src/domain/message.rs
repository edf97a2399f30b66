use crate::domain::channel::{Recipient, SettingsOverride};
use crate::domain::render::Variables;
use crate::domain::{ChannelId, DomainError, MessageId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Success,
    Failed,
    PartialSuccess,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PartialSuccess => "partial_success",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Derives the aggregate status from the results gathered so far.
    #[must_use]
    pub fn derive(results: &[MessageResult], expected: usize) -> Self {
        if results.is_empty() || results.len() < expected {
            return Self::Pending;
        }
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        if succeeded == results.len() {
            Self::Success
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "partial_success" => Ok(Self::PartialSuccess),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Reason a single channel did not receive the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ChannelNotFound,
    ChannelDeleted,
    ChannelDisabled,
    NoRecipients,
    UnknownChannelType,
    InvalidConfig,
    TemplateNotFound,
    TypeMismatch,
    MissingVariables,
    RenderError,
    SendError,
    Timeout,
    Cancelled,
}

impl ErrorCode {
    pub const ALL: [Self; 13] = [
        Self::ChannelNotFound,
        Self::ChannelDeleted,
        Self::ChannelDisabled,
        Self::NoRecipients,
        Self::UnknownChannelType,
        Self::InvalidConfig,
        Self::TemplateNotFound,
        Self::TypeMismatch,
        Self::MissingVariables,
        Self::RenderError,
        Self::SendError,
        Self::Timeout,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChannelNotFound => "CHANNEL_NOT_FOUND",
            Self::ChannelDeleted => "CHANNEL_DELETED",
            Self::ChannelDisabled => "CHANNEL_DISABLED",
            Self::NoRecipients => "NO_RECIPIENTS",
            Self::UnknownChannelType => "UNKNOWN_CHANNEL_TYPE",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::MissingVariables => "MISSING_VARIABLES",
            Self::RenderError => "RENDER_ERROR",
            Self::SendError => "SEND_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|c| c.as_str() == s).ok_or_else(|| format!("unknown error code: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    pub code: ErrorCode,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOutcome {
    Success,
    Failed,
}

impl ResultOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of delivering one message to one channel.
///
/// Built only through [`MessageResult::success`] and [`MessageResult::failure`]
/// so that a success always has `sent_at` and a failure always has `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResult {
    pub channel_id: ChannelId,
    pub outcome: ResultOutcome,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
}

impl MessageResult {
    #[must_use]
    pub fn success(channel_id: ChannelId, sent_at: i64) -> Self {
        Self {
            channel_id,
            outcome: ResultOutcome::Success,
            message: "Message sent successfully".to_string(),
            error: None,
            sent_at: Some(sent_at),
        }
    }

    #[must_use]
    pub fn failure(channel_id: ChannelId, code: ErrorCode, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            channel_id,
            outcome: ResultOutcome::Failed,
            message: message.into(),
            error: Some(ResultError { code, details: details.into() }),
            sent_at: None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, ResultOutcome::Success)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, ResultOutcome::Failed)
    }

    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Per-channel, per-request adjustments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<Recipient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_settings: Option<SettingsOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message must target at least one channel")]
    NoChannels,
    #[error("channel {0} is not targeted by this message")]
    UnknownChannel(ChannelId),
    #[error("channel {0} already has a result")]
    DuplicateResult(ChannelId),
    #[error("override for channel {channel_id}: {source}")]
    InvalidOverride { channel_id: ChannelId, source: DomainError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One dispatch of a notification to a set of channels. Owns its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    channel_ids: Vec<ChannelId>,
    pub variables: Variables,
    pub overrides: BTreeMap<ChannelId, ChannelOverride>,
    status: MessageStatus,
    results: Vec<MessageResult>,
    pub created_at: i64,
}

impl Message {
    /// Creates a pending message. Duplicate channel ids collapse onto their
    /// first occurrence.
    ///
    /// # Errors
    /// Returns `MessageError::NoChannels` if no channel id remains.
    pub fn new(
        id: MessageId,
        channel_ids: Vec<ChannelId>,
        variables: Variables,
        overrides: BTreeMap<ChannelId, ChannelOverride>,
        created_at: i64,
    ) -> Result<Self, MessageError> {
        let channel_ids = dedup_channel_ids(channel_ids);
        if channel_ids.is_empty() {
            return Err(MessageError::NoChannels);
        }
        for (channel_id, o) in &overrides {
            if let Some(settings) = &o.common_settings {
                settings
                    .validate()
                    .map_err(|source| MessageError::InvalidOverride { channel_id: channel_id.clone(), source })?;
            }
        }
        Ok(Self { id, channel_ids, variables, overrides, status: MessageStatus::Pending, results: Vec::new(), created_at })
    }

    /// Rebuilds a stored message. The status is derived from `results`
    /// rather than trusted from storage.
    ///
    /// # Errors
    /// Returns `MessageError` if the stored results break an invariant.
    pub fn restore(
        id: MessageId,
        channel_ids: Vec<ChannelId>,
        variables: Variables,
        overrides: BTreeMap<ChannelId, ChannelOverride>,
        results: Vec<MessageResult>,
        created_at: i64,
    ) -> Result<Self, MessageError> {
        let mut message = Self::new(id, channel_ids, variables, overrides, created_at)?;
        for result in results {
            message.add_result(result)?;
        }
        Ok(message)
    }

    #[must_use]
    pub fn channel_ids(&self) -> &[ChannelId] {
        &self.channel_ids
    }

    #[must_use]
    pub const fn status(&self) -> MessageStatus {
        self.status
    }

    #[must_use]
    pub fn results(&self) -> &[MessageResult] {
        &self.results
    }

    #[must_use]
    pub fn override_for(&self, channel_id: &ChannelId) -> Option<&ChannelOverride> {
        self.overrides.get(channel_id)
    }

    #[must_use]
    pub fn result_for(&self, channel_id: &ChannelId) -> Option<&MessageResult> {
        self.results.iter().find(|r| &r.channel_id == channel_id)
    }

    /// Appends a result and recomputes the status.
    ///
    /// # Errors
    /// Rejects results for channels outside the message or channels that
    /// already have one.
    pub fn add_result(&mut self, result: MessageResult) -> Result<(), MessageError> {
        if !self.channel_ids.contains(&result.channel_id) {
            return Err(MessageError::UnknownChannel(result.channel_id));
        }
        if self.result_for(&result.channel_id).is_some() {
            return Err(MessageError::DuplicateResult(result.channel_id));
        }
        self.results.push(result);
        self.status = MessageStatus::derive(&self.results, self.channel_ids.len());
        Ok(())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.channel_ids.len()
    }

    #[must_use]
    pub fn summary(&self) -> MessageSummary {
        let succeeded = self.results.iter().filter(|r| r.is_success()).count();
        MessageSummary { total: self.channel_ids.len(), succeeded, failed: self.results.len() - succeeded }
    }
}

/// Removes repeated ids, keeping the first occurrence of each.
#[must_use]
pub fn dedup_channel_ids(channel_ids: Vec<ChannelId>) -> Vec<ChannelId> {
    let mut seen = HashSet::new();
    channel_ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
