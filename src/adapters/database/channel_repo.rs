use super::records::ChannelRecord;
use super::{DbPool, is_unique_violation};
use crate::domain::{Channel, ChannelId};
use crate::storage::{ChannelRepository, Result, StorageError};
use async_trait::async_trait;
use sqlx::types::Json;

const COLUMNS: &str = "id, name, description, enabled, channel_type, template_id, common_settings, config, \
                       recipients, tags, created_at, updated_at, deleted_at, last_used_at";

#[derive(Clone, Debug)]
pub struct PgChannelRepository {
    pool: DbPool,
}

impl PgChannelRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for PgChannelRepository {
    #[tracing::instrument(level = "debug", skip(self), fields(channel_id = %id), err(level = "debug"))]
    async fn find_by_id(&self, id: &ChannelId) -> Result<Channel> {
        let record = sqlx::query_as::<_, ChannelRecord>(&format!(
            "SELECT {COLUMNS} FROM channels WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(Into::into).ok_or_else(|| StorageError::ChannelNotFound(id.clone()))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_name(&self, name: &str) -> Result<Channel> {
        let record = sqlx::query_as::<_, ChannelRecord>(&format!(
            "SELECT {COLUMNS} FROM channels WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Into::into).ok_or_else(|| StorageError::ChannelNotFound(ChannelId::from(name)))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM channels WHERE name = $1 AND deleted_at IS NULL)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[tracing::instrument(level = "debug", skip(self, channel), fields(channel_id = %channel.id))]
    async fn create(&self, channel: &Channel) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO channels ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(channel.id.as_str())
        .bind(&channel.name)
        .bind(&channel.description)
        .bind(channel.enabled)
        .bind(&channel.channel_type)
        .bind(channel.template_id.as_ref().map(|t| t.as_str()))
        .bind(Json(&channel.common_settings))
        .bind(Json(&channel.config))
        .bind(Json(&channel.recipients))
        .bind(channel.tags.iter().cloned().collect::<Vec<_>>())
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .bind(channel.deleted_at)
        .bind(channel.last_used_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StorageError::Conflict(format!("channel {} or name '{}' already exists", channel.id, channel.name)))
            }
            Err(e) => Err(StorageError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, channel), fields(channel_id = %channel.id))]
    async fn update(&self, channel: &Channel) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE channels
            SET name = $2, description = $3, enabled = $4, channel_type = $5, template_id = $6,
                common_settings = $7, config = $8, recipients = $9, tags = $10,
                updated_at = $11, deleted_at = $12, last_used_at = $13
            WHERE id = $1
            "#,
        )
        .bind(channel.id.as_str())
        .bind(&channel.name)
        .bind(&channel.description)
        .bind(channel.enabled)
        .bind(&channel.channel_type)
        .bind(channel.template_id.as_ref().map(|t| t.as_str()))
        .bind(Json(&channel.common_settings))
        .bind(Json(&channel.config))
        .bind(Json(&channel.recipients))
        .bind(channel.tags.iter().cloned().collect::<Vec<_>>())
        .bind(channel.updated_at)
        .bind(channel.deleted_at)
        .bind(channel.last_used_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StorageError::ChannelNotFound(channel.id.clone())),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StorageError::Conflict(format!("channel name '{}' is taken", channel.name)))
            }
            Err(e) => Err(StorageError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(channel_id = %id))]
    async fn mark_as_used(&self, id: &ChannelId, now: i64) -> Result<()> {
        let done = sqlx::query("UPDATE channels SET last_used_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(StorageError::ChannelNotFound(id.clone()));
        }
        Ok(())
    }
}
