//! Repository ports consumed by the dispatch engine.
//!
//! Read paths never return soft-deleted channels or templates.

use crate::domain::{Channel, ChannelId, Message, MessageId, Template, TemplateId};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),
    #[error("template {0} not found")]
    TemplateNotFound(TemplateId),
    #[error("message {0} not found")]
    MessageNotFound(MessageId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StorageError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ChannelNotFound(_) | Self::TemplateNotFound(_) | Self::MessageNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait ChannelRepository: Send + Sync + Debug {
    /// # Errors
    /// `ChannelNotFound` if absent or soft-deleted.
    async fn find_by_id(&self, id: &ChannelId) -> Result<Channel>;

    /// # Errors
    /// `ChannelNotFound` if no live channel has this name.
    async fn find_by_name(&self, name: &str) -> Result<Channel>;

    /// Whether a live channel uses `name`.
    ///
    /// # Errors
    /// Backend failures only.
    async fn exists_by_name(&self, name: &str) -> Result<bool>;

    /// # Errors
    /// `Conflict` if the id or live name is taken.
    async fn create(&self, channel: &Channel) -> Result<()>;

    /// Replaces the stored channel. Accepts soft-deleted channels.
    ///
    /// # Errors
    /// `ChannelNotFound` if the id was never stored.
    async fn update(&self, channel: &Channel) -> Result<()>;

    /// Sets only `last_used_at` on a live channel; every other field is left as stored.
    ///
    /// # Errors
    /// `ChannelNotFound` if absent or soft-deleted.
    async fn mark_as_used(&self, id: &ChannelId, now: i64) -> Result<()>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync + Debug {
    /// # Errors
    /// `TemplateNotFound` if absent or soft-deleted.
    async fn find_by_id(&self, id: &TemplateId) -> Result<Template>;

    /// # Errors
    /// Backend failures only.
    async fn exists_by_name(&self, name: &str) -> Result<bool>;

    /// # Errors
    /// `Conflict` if the id or live name is taken.
    async fn create(&self, template: &Template) -> Result<()>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync + Debug {
    /// Persists the aggregate and its current results atomically.
    ///
    /// # Errors
    /// `Conflict` if the id already exists.
    async fn save(&self, message: &Message) -> Result<()>;

    /// Replaces the stored status and results with the aggregate's, atomically.
    ///
    /// # Errors
    /// `MessageNotFound` if the message was never saved.
    async fn update(&self, message: &Message) -> Result<()>;

    /// Reconstructs the aggregate with results in insertion order.
    ///
    /// # Errors
    /// `MessageNotFound` if absent.
    async fn find_by_id(&self, id: &MessageId) -> Result<Message>;
}
