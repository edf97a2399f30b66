use crate::domain::{ChannelId, DomainError, TemplateId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// How a recipient is addressed within its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    To,
    Cc,
    Bcc,
    Channel,
    User,
}

impl RecipientType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::To => "to",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
            Self::Channel => "channel",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    #[serde(rename = "type")]
    pub recipient_type: RecipientType,
    pub target: String,
}

impl Recipient {
    #[must_use]
    pub fn new(name: impl Into<String>, recipient_type: RecipientType, target: impl Into<String>) -> Self {
        Self { name: name.into(), recipient_type, target: target.into() }
    }
}

/// Delivery tuning shared by every channel type. Durations are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonSettings {
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000, retry_attempts: 3, retry_delay_ms: 1_000 }
    }
}

/// Per-request adjustment of [`CommonSettings`]; absent fields keep the channel's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl SettingsOverride {
    /// # Errors
    /// Returns `DomainError` if the timeout override is zero.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.timeout_ms == Some(0) {
            return Err(DomainError::new("commonSettings.timeoutMs", "must be greater than zero"));
        }
        Ok(())
    }
}

impl CommonSettings {
    #[must_use]
    pub fn merged(self, patch: Option<&SettingsOverride>) -> Self {
        let Some(patch) = patch else {
            return self;
        };
        Self {
            timeout_ms: patch.timeout_ms.unwrap_or(self.timeout_ms),
            retry_attempts: patch.retry_attempts.unwrap_or(self.retry_attempts),
            retry_delay_ms: patch.retry_delay_ms.unwrap_or(self.retry_delay_ms),
        }
    }

    /// # Errors
    /// Returns `DomainError` if the timeout is zero.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.timeout_ms == 0 {
            return Err(DomainError::new("commonSettings.timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

/// A primitive value in a channel's configuration mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Reads a non-negative integer. JSON-style floats are accepted when they
    /// carry no fractional part, so `160` and `160.0` both yield `Some(160)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(i) => u64::try_from(*i).ok(),
            Self::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64 => {
                Some(*f as u64)
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "number",
            Self::String(_) => "string",
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Free-form configuration of a channel. Each channel type parses it into its
/// own typed settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelConfig(BTreeMap<String, ConfigValue>);

impl ChannelConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ConfigValue)> for ChannelConfig {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub channel_type: String,
    pub template_id: Option<TemplateId>,
    pub common_settings: CommonSettings,
    pub config: ChannelConfig,
    pub recipients: Vec<Recipient>,
    pub tags: BTreeSet<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    pub last_used_at: Option<i64>,
}

impl Channel {
    /// Creates an enabled channel with default settings and an empty config.
    /// Duplicate recipients are dropped, keeping the first occurrence.
    #[must_use]
    pub fn new(
        id: ChannelId,
        name: impl Into<String>,
        channel_type: impl Into<String>,
        recipients: Vec<Recipient>,
        now: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            enabled: true,
            channel_type: channel_type.into(),
            template_id: None,
            common_settings: CommonSettings::default(),
            config: ChannelConfig::default(),
            recipients: dedup_recipients(recipients),
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            last_used_at: None,
        }
    }

    #[must_use]
    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn with_settings(mut self, settings: CommonSettings) -> Self {
        self.common_settings = settings;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns a copy addressed to `recipients` instead of the stored set.
    #[must_use]
    pub fn with_recipients(&self, recipients: Vec<Recipient>) -> Self {
        Self { recipients: dedup_recipients(recipients), ..self.clone() }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    #[must_use]
    pub fn can_send(&self) -> bool {
        !self.is_deleted() && self.enabled && !self.recipients.is_empty()
    }

    /// Marks the channel deleted. Deletion is permanent: a second call keeps
    /// the original timestamp.
    pub fn soft_delete(&mut self, now: i64) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
            self.updated_at = now;
        }
    }

    pub const fn mark_as_used(&mut self, now: i64) {
        self.last_used_at = Some(now);
    }

    /// Checks the invariants that do not need a registry or repository.
    ///
    /// # Errors
    /// Returns the first violated field.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_name(&self.name)?;
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DomainError::new(
                "description",
                format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
            ));
        }
        self.common_settings.validate()?;
        for recipient in &self.recipients {
            if recipient.name.trim().is_empty() {
                return Err(DomainError::new("recipients.name", "must not be empty"));
            }
            if recipient.target.trim().is_empty() {
                return Err(DomainError::new("recipients.target", "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Channel names are 1 to 100 characters from `[A-Za-z0-9_-]`.
///
/// # Errors
/// Returns `DomainError` describing why the name is rejected.
pub fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::new("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::new("name", format!("must be at most {MAX_NAME_LEN} characters")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(DomainError::new("name", "may only contain letters, digits, '_' and '-'"));
    }
    Ok(())
}

fn dedup_recipients(recipients: Vec<Recipient>) -> Vec<Recipient> {
    let mut seen = std::collections::HashSet::new();
    recipients.into_iter().filter(|r| seen.insert((r.recipient_type, r.target.clone()))).collect()
}
