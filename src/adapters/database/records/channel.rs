use crate::domain::{Channel, ChannelConfig, ChannelId, CommonSettings, Recipient, TemplateId};
use sqlx::types::Json;

#[derive(Debug, sqlx::FromRow)]
pub struct ChannelRecord {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) enabled: bool,
    pub(crate) channel_type: String,
    pub(crate) template_id: Option<String>,
    pub(crate) common_settings: Json<CommonSettings>,
    pub(crate) config: Json<ChannelConfig>,
    pub(crate) recipients: Json<Vec<Recipient>>,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
    pub(crate) deleted_at: Option<i64>,
    pub(crate) last_used_at: Option<i64>,
}

impl From<ChannelRecord> for Channel {
    fn from(record: ChannelRecord) -> Self {
        Self {
            id: ChannelId::new(record.id),
            name: record.name,
            description: record.description,
            enabled: record.enabled,
            channel_type: record.channel_type,
            template_id: record.template_id.map(TemplateId::new),
            common_settings: record.common_settings.0,
            config: record.config.0,
            recipients: record.recipients.0,
            tags: record.tags.into_iter().collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
            last_used_at: record.last_used_at,
        }
    }
}
