use crate::domain::{Message, MessageId};
use crate::storage::{MessageRepository, Result, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Stores whole aggregates, so save and update are trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    messages: DashMap<MessageId, Message>,
}

impl InMemoryMessageRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.id))]
    async fn save(&self, message: &Message) -> Result<()> {
        match self.messages.entry(message.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!("message {} already exists", message.id))),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                Ok(())
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.id, status = %message.status()))]
    async fn update(&self, message: &Message) -> Result<()> {
        match self.messages.get_mut(&message.id) {
            Some(mut stored) => {
                *stored = message.clone();
                Ok(())
            }
            None => Err(StorageError::MessageNotFound(message.id.clone())),
        }
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Message> {
        self.messages.get(id).map(|m| m.clone()).ok_or_else(|| StorageError::MessageNotFound(id.clone()))
    }
}
