use super::records::TemplateRecord;
use super::{DbPool, is_unique_violation};
use crate::domain::{Template, TemplateId};
use crate::storage::{Result, StorageError, TemplateRepository};
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct PgTemplateRepository {
    pool: DbPool,
}

impl PgTemplateRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    #[tracing::instrument(level = "debug", skip(self), fields(template_id = %id), err(level = "debug"))]
    async fn find_by_id(&self, id: &TemplateId) -> Result<Template> {
        let record = sqlx::query_as::<_, TemplateRecord>(
            r#"
            SELECT id, name, description, channel_type, subject, body, tags, version,
                   created_at, updated_at, deleted_at
            FROM templates
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(Into::into).ok_or_else(|| StorageError::TemplateNotFound(id.clone()))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM templates WHERE name = $1 AND deleted_at IS NULL)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[tracing::instrument(level = "debug", skip(self, template), fields(template_id = %template.id))]
    async fn create(&self, template: &Template) -> Result<()> {
        let version = i32::try_from(template.version)
            .map_err(|_| StorageError::Conflict(format!("template version {} out of range", template.version)))?;
        let result = sqlx::query(
            r#"
            INSERT INTO templates
                (id, name, description, channel_type, subject, body, tags, version, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(template.id.as_str())
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.channel_type)
        .bind(template.subject.as_deref())
        .bind(&template.body)
        .bind(template.tags.iter().cloned().collect::<Vec<_>>())
        .bind(version)
        .bind(template.created_at)
        .bind(template.updated_at)
        .bind(template.deleted_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::Conflict(format!(
                "template {} or name '{}' already exists",
                template.id, template.name
            ))),
            Err(e) => Err(StorageError::Database(e)),
        }
    }
}
