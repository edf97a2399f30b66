use super::DispatchService;
use crate::domain::render::{extract_variables_from, missing_variables};
use crate::domain::{
    Channel, ChannelId, CommonSettings, ErrorCode, Message, MessageResult, RenderRequest, RenderedContent, Template,
    TemplateId, now_ms,
};
use crate::storage::StorageError;
use crate::transport::{SendContext, TransportErrorKind};
use std::time::Duration;

/// Why a channel did not receive the message.
#[derive(Debug)]
struct ChannelFailure {
    code: ErrorCode,
    message: &'static str,
    details: String,
}

impl ChannelFailure {
    fn new(code: ErrorCode, message: &'static str, details: impl Into<String>) -> Self {
        Self { code, message, details: details.into() }
    }

    fn into_result(self, channel_id: ChannelId) -> MessageResult {
        MessageResult::failure(channel_id, self.code, self.message, self.details)
    }
}

impl DispatchService {
    /// Runs every step for one channel. Never fails: errors become a failed result.
    #[tracing::instrument(level = "debug", skip(self, ctx, message), fields(channel_id = %channel_id))]
    pub(super) async fn dispatch_channel(
        &self,
        ctx: &SendContext,
        message: &Message,
        channel_id: &ChannelId,
    ) -> MessageResult {
        match self.try_dispatch_channel(ctx, message, channel_id).await {
            Ok(()) => {
                let sent_at = now_ms().max(message.created_at);
                self.mark_as_used(channel_id, sent_at).await;
                tracing::debug!("channel delivered");
                MessageResult::success(channel_id.clone(), sent_at)
            }
            Err(failure) => {
                tracing::info!(code = %failure.code, details = %failure.details, "channel failed");
                failure.into_result(channel_id.clone())
            }
        }
    }

    async fn try_dispatch_channel(
        &self,
        ctx: &SendContext,
        message: &Message,
        channel_id: &ChannelId,
    ) -> Result<(), ChannelFailure> {
        let stored = match self.channels.find_by_id(channel_id).await {
            Ok(channel) if !channel.is_deleted() => channel,
            Ok(_) => {
                return Err(ChannelFailure::new(ErrorCode::ChannelNotFound, "Channel not found", "channel is deleted"));
            }
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(error = %e, "channel lookup failed");
                }
                return Err(ChannelFailure::new(ErrorCode::ChannelNotFound, "Channel not found", e.to_string()));
            }
        };

        let overrides = message.override_for(channel_id);
        let channel = match overrides.and_then(|o| o.recipients.clone()) {
            Some(recipients) => stored.with_recipients(recipients),
            None => stored,
        };

        self.validator
            .validate_for_send(&channel)
            .map_err(|e| ChannelFailure::new(e.error_code(), "Channel validation failed", e.to_string()))?;

        let template = match &channel.template_id {
            Some(template_id) => Some(self.load_template(&channel, template_id).await?),
            None => None,
        };

        let subject = overrides
            .and_then(|o| o.subject.clone())
            .or_else(|| template.as_ref().and_then(|t| t.subject.clone()))
            .unwrap_or_default();
        let body = overrides
            .and_then(|o| o.body.clone())
            .or_else(|| template.as_ref().map(|t| t.body.clone()))
            .unwrap_or_else(|| self.config.default_body.clone());

        if template.is_some() {
            let required = extract_variables_from(&[subject.as_str(), body.as_str()]);
            let missing = missing_variables(&required, &message.variables);
            if !missing.is_empty() {
                return Err(ChannelFailure::new(
                    ErrorCode::MissingVariables,
                    "Missing required variables",
                    missing.join(", "),
                ));
            }
        }

        let content = self
            .renderer
            .render(&RenderRequest { subject, body, variables: message.variables.clone() })
            .map_err(|e| ChannelFailure::new(ErrorCode::RenderError, "Failed to render message", e.to_string()))?;

        let settings = channel.common_settings.merged(overrides.and_then(|o| o.common_settings.as_ref()));
        self.send(ctx, &channel, &content, settings).await
    }

    async fn load_template(
        &self,
        channel: &Channel,
        template_id: &TemplateId,
    ) -> Result<Template, ChannelFailure> {
        let template = self.templates.find_by_id(template_id).await.map_err(|e| {
            if !matches!(e, StorageError::TemplateNotFound(_)) {
                tracing::warn!(error = %e, template_id = %template_id, "template lookup failed");
            }
            ChannelFailure::new(ErrorCode::TemplateNotFound, "Template not found", e.to_string())
        })?;

        if template.channel_type != channel.channel_type {
            return Err(ChannelFailure::new(
                ErrorCode::TypeMismatch,
                "Template type does not match channel type",
                format!("template is '{}', channel is '{}'", template.channel_type, channel.channel_type),
            ));
        }
        Ok(template)
    }

    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        content: &RenderedContent,
        settings: CommonSettings,
    ) -> Result<(), ChannelFailure> {
        let timeout = Duration::from_millis(settings.timeout_ms);
        let transport = self
            .registry
            .get(&channel.channel_type)
            .map_err(|e| ChannelFailure::new(ErrorCode::UnknownChannelType, "Channel validation failed", e.to_string()))?
            .create_transport(timeout)
            .map_err(|e| ChannelFailure::new(ErrorCode::SendError, "Failed to send message", e.details))?;

        self.deliver(ctx, transport.as_ref(), channel, content, settings).await.map_err(|e| match e.kind {
            TransportErrorKind::Timeout => ChannelFailure::new(ErrorCode::Timeout, "Send timed out", e.details),
            TransportErrorKind::Cancelled => ChannelFailure::new(ErrorCode::Cancelled, "Send cancelled", e.details),
            TransportErrorKind::Transient | TransportErrorKind::Permanent => {
                ChannelFailure::new(ErrorCode::SendError, "Failed to send message", e.details)
            }
        })
    }

    /// Best effort: a failed update is only logged.
    async fn mark_as_used(&self, channel_id: &ChannelId, now: i64) {
        if let Err(e) = self.channels.mark_as_used(channel_id, now).await {
            tracing::warn!(channel_id = %channel_id, error = %e, "failed to mark channel as used");
        }
    }
}
