use super::{
    ChannelTypeDefinition, ConfigSchema, FieldKind, FieldSchema, optional_bool, optional_str, required_str,
};
use crate::config::SmtpConfig;
use crate::domain::{Channel, ChannelConfig, Recipient, RecipientType, RenderedContent};
use crate::transport::{ConfigError, SendContext, Transport, TransportError};
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor};
use std::time::Duration;

pub const NAME: &str = "email";

/// Typed view of an email channel's config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub from: Mailbox,
    pub reply_to: Option<Mailbox>,
    pub html: bool,
}

impl EmailSettings {
    /// # Errors
    /// Returns the first field that is missing or malformed.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        let from = required_str(config, "from")?;
        if !from.contains('@') {
            return Err(ConfigError::new("from", "must be an email address"));
        }
        let from = from.parse::<Mailbox>().map_err(|e| ConfigError::new("from", e.to_string()))?;
        let reply_to = optional_str(config, "reply_to")?
            .map(|s| s.parse::<Mailbox>().map_err(|e| ConfigError::new("reply_to", e.to_string())))
            .transpose()?;
        let html = optional_bool(config, "html")?.unwrap_or(false);
        Ok(Self { from, reply_to, html })
    }
}

#[derive(Debug, Clone)]
pub struct EmailChannelType {
    smtp: SmtpConfig,
}

impl EmailChannelType {
    #[must_use]
    pub const fn new(smtp: SmtpConfig) -> Self {
        Self { smtp }
    }

    fn mailer(&self, timeout: Duration) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let builder = if self.smtp.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)
                .map_err(|e| TransportError::permanent("smtp_config", e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp.host)
        };
        let mut builder = builder.port(self.smtp.port).timeout(Some(timeout));
        if let (Some(user), Some(pass)) = (&self.smtp.username, &self.smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(builder.build())
    }
}

impl ChannelTypeDefinition for EmailChannelType {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Email"
    }

    fn description(&self) -> &str {
        "Delivers messages over SMTP to to/cc/bcc recipients"
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        EmailSettings::from_config(config).map(|_| ())
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema {
            fields: vec![
                FieldSchema::required("from", FieldKind::String, "Sender address, optionally with a display name"),
                FieldSchema::optional("reply_to", FieldKind::String, "Reply-To address"),
                FieldSchema::optional("html", FieldKind::Boolean, "Send the body as text/html").with_default(false),
            ],
            recipient_types: vec!["to", "cc", "bcc"],
        }
    }

    fn create_transport(&self, timeout: Duration) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(EmailTransport { mailer: self.mailer(timeout)? }))
    }

    fn validate_recipient(&self, recipient: &Recipient) -> Result<(), ConfigError> {
        if !matches!(recipient.recipient_type, RecipientType::To | RecipientType::Cc | RecipientType::Bcc) {
            return Err(ConfigError::new(
                "recipients.type",
                format!("'{}' is not valid for email; use to, cc or bcc", recipient.recipient_type.as_str()),
            ));
        }
        recipient
            .target
            .parse::<Address>()
            .map(|_| ())
            .map_err(|e| ConfigError::new("recipients.target", format!("'{}': {e}", recipient.target)))
    }
}

#[derive(Debug)]
pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl Transport for EmailTransport {
    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        content: &RenderedContent,
    ) -> Result<(), TransportError> {
        if ctx.is_cancelled() {
            return Err(TransportError::cancelled());
        }
        let settings = EmailSettings::from_config(&channel.config)
            .map_err(|e| TransportError::permanent("invalid_config", e.to_string()))?;
        let email = build_email(&settings, &channel.recipients, content)?;

        match self.mailer.send(email).await {
            Ok(response) => {
                tracing::debug!(code = %response.code(), "smtp relay accepted message");
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(TransportError::transient("io_timeout", e.to_string())),
            Err(e) if e.is_permanent() => Err(TransportError::permanent(smtp_code(&e), e.to_string())),
            Err(e) => Err(TransportError::transient(smtp_code(&e), e.to_string())),
        }
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        EmailSettings::from_config(config).map(|_| ())
    }

    fn type_name(&self) -> &str {
        NAME
    }
}

fn smtp_code(e: &lettre::transport::smtp::Error) -> String {
    e.status().map_or_else(|| "smtp".to_string(), |code| code.to_string())
}

/// Builds one message addressed to every recipient of the channel.
///
/// # Errors
/// Returns a permanent error for unusable recipients or when the message cannot be assembled.
pub fn build_email(
    settings: &EmailSettings,
    recipients: &[Recipient],
    content: &RenderedContent,
) -> Result<Email, TransportError> {
    let mut builder = Email::builder().from(settings.from.clone()).subject(content.subject.clone());
    if let Some(reply_to) = &settings.reply_to {
        builder = builder.reply_to(reply_to.clone());
    }

    for recipient in recipients {
        let address = recipient
            .target
            .parse::<Address>()
            .map_err(|e| TransportError::permanent("invalid_recipient", format!("{}: {e}", recipient.target)))?;
        let name = Some(recipient.name.clone()).filter(|n| !n.trim().is_empty());
        let mailbox = Mailbox::new(name, address);
        builder = match recipient.recipient_type {
            RecipientType::To => builder.to(mailbox),
            RecipientType::Cc => builder.cc(mailbox),
            RecipientType::Bcc => builder.bcc(mailbox),
            other => {
                return Err(TransportError::permanent(
                    "invalid_recipient",
                    format!("recipient type '{}' is not supported by email", other.as_str()),
                ));
            }
        };
    }

    let content_type = if settings.html { ContentType::TEXT_HTML } else { ContentType::TEXT_PLAIN };
    builder
        .header(content_type)
        .body(content.body.clone())
        .map_err(|e| TransportError::permanent("message_build", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmailSettings {
        EmailSettings::from_config(&ChannelConfig::new().with("from", "Ops <ops@example.com>")).unwrap()
    }

    fn content() -> RenderedContent {
        RenderedContent { subject: "Hi Ada".into(), body: "Hello Ada".into() }
    }

    #[test]
    fn test_config_requires_from_address() {
        let err = EmailSettings::from_config(&ChannelConfig::new()).unwrap_err();
        assert_eq!(err.field, "from");

        let err = EmailSettings::from_config(&ChannelConfig::new().with("from", "nobody")).unwrap_err();
        assert_eq!(err.field, "from");

        let err = EmailSettings::from_config(&ChannelConfig::new().with("from", "a@b.io").with("html", "yes"))
            .unwrap_err();
        assert_eq!(err.field, "html");
    }

    #[test]
    fn test_config_parses_optional_fields() {
        let config = ChannelConfig::new().with("from", "a@b.io").with("reply_to", "r@b.io").with("html", true);
        let settings = EmailSettings::from_config(&config).unwrap();
        assert!(settings.html);
        assert_eq!(settings.reply_to.unwrap().email.to_string(), "r@b.io");
    }

    #[test]
    fn test_recipient_rules() {
        let def = EmailChannelType::new(SmtpConfig::default());
        assert!(def.validate_recipient(&Recipient::new("u", RecipientType::Cc, "u@x.io")).is_ok());
        assert_eq!(
            def.validate_recipient(&Recipient::new("u", RecipientType::Channel, "u@x.io")).unwrap_err().field,
            "recipients.type"
        );
        assert_eq!(
            def.validate_recipient(&Recipient::new("u", RecipientType::To, "not-an-address")).unwrap_err().field,
            "recipients.target"
        );
    }

    #[test]
    fn test_build_email_addresses_all_recipients() {
        let recipients = vec![
            Recipient::new("a", RecipientType::To, "a@x.io"),
            Recipient::new("b", RecipientType::Cc, "b@x.io"),
            Recipient::new("c", RecipientType::Bcc, "c@x.io"),
        ];
        let email = build_email(&settings(), &recipients, &content()).unwrap();
        assert_eq!(email.envelope().to().len(), 3);

        let formatted = String::from_utf8(email.formatted()).unwrap();
        assert!(formatted.contains("Subject: Hi Ada"));
        assert!(formatted.contains("Hello Ada"));
        assert!(!formatted.contains("c@x.io"));
    }

    #[test]
    fn test_build_email_rejects_chat_recipients() {
        let recipients = vec![Recipient::new("ops", RecipientType::Channel, "#ops")];
        let err = build_email(&settings(), &recipients, &content()).unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(err.code, "invalid_recipient");
    }

    #[test]
    fn test_schema_lists_required_from() {
        let schema = EmailChannelType::new(SmtpConfig::default()).config_schema();
        let required: Vec<_> = schema.required_fields().map(|f| f.name).collect();
        assert_eq!(required, vec!["from"]);
    }
}
