use crate::domain::{
    ChannelId, ChannelOverride, Message, MessageId, MessageResult, MessageStatus, MessageSummary, Variables,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub channel_ids: Vec<ChannelId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Variables,
    #[serde(default, deserialize_with = "null_as_default")]
    pub overrides: BTreeMap<ChannelId, ChannelOverride>,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: MessageId,
    pub channel_ids: Vec<ChannelId>,
    pub status: MessageStatus,
    pub results: Vec<MessageResult>,
    pub summary: MessageSummary,
    pub created_at: i64,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            summary: m.summary(),
            status: m.status(),
            channel_ids: m.channel_ids().to_vec(),
            results: m.results().to_vec(),
            id: m.id,
            created_at: m.created_at,
        }
    }
}
