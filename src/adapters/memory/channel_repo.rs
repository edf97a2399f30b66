use crate::domain::{Channel, ChannelId};
use crate::storage::{ChannelRepository, Result, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Default)]
pub struct InMemoryChannelRepository {
    channels: DashMap<ChannelId, Channel>,
}

impl InMemoryChannelRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored channel including soft-deleted ones.
    #[must_use]
    pub fn get_raw(&self, id: &ChannelId) -> Option<Channel> {
        self.channels.get(id).map(|c| c.clone())
    }

    fn live_name_taken(&self, name: &str, except: Option<&ChannelId>) -> bool {
        self.channels.iter().any(|c| !c.is_deleted() && c.name == name && Some(&c.id) != except)
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    #[tracing::instrument(level = "debug", skip(self), fields(channel_id = %id))]
    async fn find_by_id(&self, id: &ChannelId) -> Result<Channel> {
        self.channels
            .get(id)
            .filter(|c| !c.is_deleted())
            .map(|c| c.clone())
            .ok_or_else(|| StorageError::ChannelNotFound(id.clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Channel> {
        self.channels
            .iter()
            .find(|c| !c.is_deleted() && c.name == name)
            .map(|c| c.clone())
            .ok_or_else(|| StorageError::ChannelNotFound(ChannelId::from(name)))
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.live_name_taken(name, None))
    }

    #[tracing::instrument(level = "debug", skip(self, channel), fields(channel_id = %channel.id))]
    async fn create(&self, channel: &Channel) -> Result<()> {
        if !channel.is_deleted() && self.live_name_taken(&channel.name, None) {
            return Err(StorageError::Conflict(format!("channel name '{}' is taken", channel.name)));
        }
        match self.channels.entry(channel.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!("channel {} already exists", channel.id))),
            Entry::Vacant(slot) => {
                slot.insert(channel.clone());
                Ok(())
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, channel), fields(channel_id = %channel.id))]
    async fn update(&self, channel: &Channel) -> Result<()> {
        if !channel.is_deleted() && self.live_name_taken(&channel.name, Some(&channel.id)) {
            return Err(StorageError::Conflict(format!("channel name '{}' is taken", channel.name)));
        }
        match self.channels.get_mut(&channel.id) {
            Some(mut stored) => {
                *stored = channel.clone();
                Ok(())
            }
            None => Err(StorageError::ChannelNotFound(channel.id.clone())),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(channel_id = %id))]
    async fn mark_as_used(&self, id: &ChannelId, now: i64) -> Result<()> {
        match self.channels.get_mut(id) {
            Some(mut stored) if !stored.is_deleted() => {
                stored.mark_as_used(now);
                Ok(())
            }
            _ => Err(StorageError::ChannelNotFound(id.clone())),
        }
    }
}
