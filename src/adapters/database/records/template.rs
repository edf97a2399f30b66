use crate::domain::{Template, TemplateId};

#[derive(Debug, sqlx::FromRow)]
pub struct TemplateRecord {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) channel_type: String,
    pub(crate) subject: Option<String>,
    pub(crate) body: String,
    pub(crate) tags: Vec<String>,
    pub(crate) version: i32,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
    pub(crate) deleted_at: Option<i64>,
}

impl From<TemplateRecord> for Template {
    fn from(record: TemplateRecord) -> Self {
        Self {
            id: TemplateId::new(record.id),
            name: record.name,
            description: record.description,
            channel_type: record.channel_type,
            subject: record.subject,
            body: record.body,
            tags: record.tags.into_iter().collect(),
            version: u32::try_from(record.version).unwrap_or(1),
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}
