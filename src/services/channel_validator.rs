use crate::channel_types::ChannelTypeRegistry;
use crate::domain::{Channel, ChannelId, ErrorCode, TemplateId};
use crate::storage::{ChannelRepository, StorageError, TemplateRepository};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("channel {0} is deleted")]
    ChannelDeleted(ChannelId),
    #[error("channel {0} is disabled")]
    ChannelDisabled(ChannelId),
    #[error("channel {0} has no recipients")]
    NoRecipients(ChannelId),
    #[error("unknown channel type '{0}'")]
    UnknownChannelType(String),
    #[error("invalid config field '{field}': {message}")]
    InvalidConfig { field: String, message: String },
    #[error("invalid channel name: {0}")]
    InvalidName(String),
    #[error("invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },
    #[error("channel name '{0}' is already in use")]
    NameTaken(String),
    #[error("template {0} not found")]
    TemplateNotFound(TemplateId),
    #[error("template type '{template_type}' does not match channel type '{channel_type}'")]
    TypeMismatch { channel_type: String, template_type: String },
    #[error("invalid recipient '{target}': {message}")]
    InvalidRecipient { target: String, message: String },
    #[error("storage error: {0}")]
    Storage(String),
}

impl ValidationError {
    /// Result code recorded when this error stops a send.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ChannelDeleted(_) => ErrorCode::ChannelDeleted,
            Self::ChannelDisabled(_) => ErrorCode::ChannelDisabled,
            Self::NoRecipients(_) => ErrorCode::NoRecipients,
            Self::UnknownChannelType(_) => ErrorCode::UnknownChannelType,
            Self::TemplateNotFound(_) => ErrorCode::TemplateNotFound,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::InvalidConfig { .. }
            | Self::InvalidName(_)
            | Self::InvalidField { .. }
            | Self::NameTaken(_)
            | Self::InvalidRecipient { .. }
            | Self::Storage(_) => ErrorCode::InvalidConfig,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelValidator {
    registry: Arc<ChannelTypeRegistry>,
    channels: Arc<dyn ChannelRepository>,
    templates: Arc<dyn TemplateRepository>,
}

impl ChannelValidator {
    #[must_use]
    pub fn new(
        registry: Arc<ChannelTypeRegistry>,
        channels: Arc<dyn ChannelRepository>,
        templates: Arc<dyn TemplateRepository>,
    ) -> Self {
        Self { registry, channels, templates }
    }

    /// Checks that `channel` can be delivered to right now.
    ///
    /// # Errors
    /// Returns the first failed check, in this order: deleted, disabled,
    /// no recipients, unknown type, invalid config.
    pub fn validate_for_send(&self, channel: &Channel) -> Result<(), ValidationError> {
        if channel.is_deleted() {
            return Err(ValidationError::ChannelDeleted(channel.id.clone()));
        }
        if !channel.enabled {
            return Err(ValidationError::ChannelDisabled(channel.id.clone()));
        }
        if channel.recipients.is_empty() {
            return Err(ValidationError::NoRecipients(channel.id.clone()));
        }
        let definition = self
            .registry
            .get(&channel.channel_type)
            .map_err(|_| ValidationError::UnknownChannelType(channel.channel_type.clone()))?;
        definition
            .validate_config(&channel.config)
            .map_err(|e| ValidationError::InvalidConfig { field: e.field, message: e.message })
    }

    /// Full validation for a channel about to be created or updated.
    ///
    /// # Errors
    /// Returns the first violated rule.
    #[tracing::instrument(err(level = "debug"), skip(self, channel), fields(channel_id = %channel.id))]
    pub async fn validate_channel(&self, channel: &Channel) -> Result<(), ValidationError> {
        channel.validate().map_err(|e| match e.field {
            "name" => ValidationError::InvalidName(e.message),
            field => ValidationError::InvalidField { field, message: e.message },
        })?;

        if self.channels.exists_by_name(&channel.name).await.map_err(storage)? {
            match self.channels.find_by_name(&channel.name).await {
                Ok(existing) if existing.id == channel.id => {}
                Ok(_) => return Err(ValidationError::NameTaken(channel.name.clone())),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(storage(e)),
            }
        }

        let definition = self
            .registry
            .get(&channel.channel_type)
            .map_err(|_| ValidationError::UnknownChannelType(channel.channel_type.clone()))?;
        definition
            .validate_config(&channel.config)
            .map_err(|e| ValidationError::InvalidConfig { field: e.field, message: e.message })?;

        for recipient in &channel.recipients {
            definition.validate_recipient(recipient).map_err(|e| ValidationError::InvalidRecipient {
                target: recipient.target.clone(),
                message: e.message,
            })?;
        }

        if let Some(template_id) = &channel.template_id {
            let template = match self.templates.find_by_id(template_id).await {
                Ok(t) => t,
                Err(StorageError::TemplateNotFound(id)) => return Err(ValidationError::TemplateNotFound(id)),
                Err(e) => return Err(storage(e)),
            };
            if template.channel_type != channel.channel_type {
                return Err(ValidationError::TypeMismatch {
                    channel_type: channel.channel_type.clone(),
                    template_type: template.channel_type,
                });
            }
        }
        Ok(())
    }
}

fn storage(e: StorageError) -> ValidationError {
    ValidationError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryChannelRepository, InMemoryTemplateRepository};
    use crate::config::TransportConfig;
    use crate::domain::{ChannelConfig, Recipient, RecipientType, Template};

    fn validator() -> (ChannelValidator, Arc<InMemoryChannelRepository>, Arc<InMemoryTemplateRepository>) {
        let registry = Arc::new(ChannelTypeRegistry::with_builtins(&TransportConfig::default()).unwrap());
        let channels = Arc::new(InMemoryChannelRepository::new());
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let validator = ChannelValidator::new(
            registry,
            Arc::clone(&channels) as Arc<dyn ChannelRepository>,
            Arc::clone(&templates) as Arc<dyn TemplateRepository>,
        );
        (validator, channels, templates)
    }

    fn email_channel() -> Channel {
        Channel::new(ChannelId::from("c1"), "ops", "email", vec![Recipient::new("u", RecipientType::To, "u@x.io")], 1)
            .with_config(ChannelConfig::new().with("from", "ops@x.io"))
    }

    #[test]
    fn test_send_checks_run_in_order() {
        let (v, _, _) = validator();
        assert!(v.validate_for_send(&email_channel()).is_ok());

        // Deleted wins over disabled and empty recipients.
        let mut c = email_channel().disabled().with_recipients(vec![]);
        c.soft_delete(2);
        assert!(matches!(v.validate_for_send(&c), Err(ValidationError::ChannelDeleted(_))));

        let c = email_channel().disabled().with_recipients(vec![]);
        assert!(matches!(v.validate_for_send(&c), Err(ValidationError::ChannelDisabled(_))));

        let mut c = email_channel().with_recipients(vec![]);
        c.channel_type = "fax".into();
        assert!(matches!(v.validate_for_send(&c), Err(ValidationError::NoRecipients(_))));

        let mut c = email_channel().with_config(ChannelConfig::new());
        c.channel_type = "fax".into();
        assert_eq!(v.validate_for_send(&c).unwrap_err(), ValidationError::UnknownChannelType("fax".into()));

        let c = email_channel().with_config(ChannelConfig::new());
        let err = v.validate_for_send(&c).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidConfig);
        assert!(matches!(err, ValidationError::InvalidConfig { ref field, .. } if field == "from"));
    }

    #[tokio::test]
    async fn test_validate_channel_checks_name_and_recipients() {
        let (v, channels, _) = validator();
        let mut bad_name = email_channel();
        bad_name.name = "a b".into();
        assert!(matches!(v.validate_channel(&bad_name).await, Err(ValidationError::InvalidName(_))));

        let slack_target = email_channel().with_recipients(vec![Recipient::new("ops", RecipientType::To, "#ops")]);
        assert!(matches!(v.validate_channel(&slack_target).await, Err(ValidationError::InvalidRecipient { .. })));

        channels.create(&email_channel()).await.unwrap();
        assert!(v.validate_channel(&email_channel()).await.is_ok());

        let mut twin = email_channel();
        twin.id = ChannelId::from("c2");
        assert_eq!(v.validate_channel(&twin).await.unwrap_err(), ValidationError::NameTaken("ops".into()));
    }

    #[tokio::test]
    async fn test_validate_channel_checks_template() {
        let (v, _, templates) = validator();
        let c = email_channel().with_template(TemplateId::from("t1"));
        assert!(matches!(v.validate_channel(&c).await, Err(ValidationError::TemplateNotFound(_))));

        templates.create(&Template::new(TemplateId::from("t1"), "sms-t", "sms", None, "x", 1)).await.unwrap();
        let err = v.validate_channel(&c).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TypeMismatch);
    }
}
