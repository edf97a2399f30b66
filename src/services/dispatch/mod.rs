//! The dispatch engine: fans one message out across its channels.
//!
//! Channels are processed one after another in request order. Every channel
//! ends with exactly one [`MessageResult`]; only an invalid request or a
//! failed write aborts the whole call.

mod delivery;
mod pipeline;

use crate::channel_types::ChannelTypeRegistry;
use crate::config::DispatchConfig;
use crate::domain::{
    ChannelId, ChannelOverride, Message, MessageError, MessageId, MessageResult, TemplateRenderer, Variables, now_ms,
};
use crate::services::channel_validator::ChannelValidator;
use crate::storage::{ChannelRepository, MessageRepository, StorageError, TemplateRepository};
use crate::transport::SendContext;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The initial save or the final update failed. `message` holds the
    /// in-memory aggregate when the failure happened after dispatching.
    #[error("failed to persist message: {source}")]
    Persistence {
        #[source]
        source: StorageError,
        message: Option<Box<Message>>,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) requests_total: Counter<u64>,
    pub(crate) channel_results_total: Counter<u64>,
    pub(crate) transport_retries_total: Counter<u64>,
    pub(crate) duration_seconds: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            requests_total: meter
                .u64_counter("courier_dispatch_requests_total")
                .with_description("Send requests by final message status")
                .build(),
            channel_results_total: meter
                .u64_counter("courier_channel_results_total")
                .with_description("Per-channel outcomes by error code")
                .build(),
            transport_retries_total: meter
                .u64_counter("courier_transport_retries_total")
                .with_description("Transport attempts retried after a transient error")
                .build(),
            duration_seconds: meter
                .f64_histogram("courier_dispatch_duration_seconds")
                .with_description("Wall time of a send request")
                .with_unit("s")
                .build(),
        }
    }

    fn record_result(&self, result: &MessageResult) {
        let code = result.error_code().map_or("NONE", |c| c.as_str());
        self.channel_results_total
            .add(1, &[KeyValue::new("outcome", result.outcome.as_str()), KeyValue::new("code", code)]);
    }
}

#[derive(Clone, Debug)]
pub struct DispatchService {
    registry: Arc<ChannelTypeRegistry>,
    validator: ChannelValidator,
    channels: Arc<dyn ChannelRepository>,
    templates: Arc<dyn TemplateRepository>,
    messages: Arc<dyn MessageRepository>,
    renderer: TemplateRenderer,
    config: DispatchConfig,
    metrics: Metrics,
}

impl DispatchService {
    #[must_use]
    pub fn new(
        registry: Arc<ChannelTypeRegistry>,
        channels: Arc<dyn ChannelRepository>,
        templates: Arc<dyn TemplateRepository>,
        messages: Arc<dyn MessageRepository>,
        config: DispatchConfig,
    ) -> Self {
        let validator = ChannelValidator::new(Arc::clone(&registry), Arc::clone(&channels), Arc::clone(&templates));
        Self {
            registry,
            validator,
            channels,
            templates,
            messages,
            renderer: TemplateRenderer,
            config,
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Sends one message to every listed channel and persists the outcome.
    ///
    /// Returning `Ok` does not mean delivery succeeded; inspect the
    /// message's status and results. If `ctx` is cancelled between channels
    /// the loop stops and the message stays `pending`.
    ///
    /// # Errors
    /// Returns `DispatchError::InvalidRequest` if no channel id remains after
    /// deduplication, and `DispatchError::Persistence` if either write fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, ctx, channel_ids, variables, overrides),
        fields(message_id = tracing::field::Empty, channels = channel_ids.len())
    )]
    pub async fn send_message(
        &self,
        ctx: &SendContext,
        channel_ids: Vec<ChannelId>,
        variables: Variables,
        overrides: BTreeMap<ChannelId, ChannelOverride>,
    ) -> Result<Message, DispatchError> {
        let started = Instant::now();
        let mut message = Message::new(MessageId::generate(), channel_ids, variables, overrides, now_ms())
            .map_err(|e| match e {
                MessageError::NoChannels => DispatchError::InvalidRequest("channelIds must not be empty".into()),
                other => DispatchError::InvalidRequest(other.to_string()),
            })?;
        tracing::Span::current().record("message_id", tracing::field::display(&message.id));

        if let Err(e) = self.messages.save(&message).await {
            tracing::error!(error = %e, "failed to save message");
            self.metrics.requests_total.add(1, &[KeyValue::new("status", "persistence_error")]);
            return Err(DispatchError::Persistence { source: e, message: None });
        }

        let channel_ids = message.channel_ids().to_vec();
        for channel_id in &channel_ids {
            if ctx.is_cancelled() {
                tracing::warn!(
                    remaining = channel_ids.len() - message.results().len(),
                    "request cancelled, skipping remaining channels"
                );
                break;
            }

            let result = self.dispatch_channel(ctx, &message, channel_id).await;
            self.metrics.record_result(&result);
            if let Err(e) = message.add_result(result) {
                tracing::error!(channel_id = %channel_id, error = %e, "result rejected by message");
            }
        }

        let status = message.status();
        self.metrics.duration_seconds.record(started.elapsed().as_secs_f64(), &[]);

        if let Err(e) = self.messages.update(&message).await {
            tracing::error!(error = %e, status = %status, "failed to persist message results");
            self.metrics.requests_total.add(1, &[KeyValue::new("status", "persistence_error")]);
            return Err(DispatchError::Persistence { source: e, message: Some(Box::new(message)) });
        }

        let summary = message.summary();
        tracing::info!(
            status = %status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "message dispatched"
        );
        self.metrics.requests_total.add(1, &[KeyValue::new("status", status.as_str())]);
        Ok(message)
    }

    /// Loads a stored message with its results.
    ///
    /// # Errors
    /// Returns `StorageError::MessageNotFound` for an unknown id.
    pub async fn get_message(&self, id: &MessageId) -> Result<Message, StorageError> {
        self.messages.find_by_id(id).await
    }

    #[must_use]
    pub fn registry(&self) -> &ChannelTypeRegistry {
        &self.registry
    }
}
