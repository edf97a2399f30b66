use super::records::{MessageRecord, MessageResultRecord};
use super::{DbPool, is_unique_violation};
use crate::domain::{Message, MessageId};
use crate::storage::{MessageRepository, Result, StorageError};
use async_trait::async_trait;
use sqlx::PgConnection;
use sqlx::types::Json;

#[derive(Clone, Debug)]
pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_results(conn: &mut PgConnection, message: &Message) -> Result<()> {
        for (position, result) in message.results().iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| StorageError::Corrupt("too many results".into()))?;
            sqlx::query(
                r#"
                INSERT INTO message_results
                    (message_id, position, channel_id, outcome, message, error_code, error_details, sent_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(message.id.as_str())
            .bind(position)
            .bind(result.channel_id.as_str())
            .bind(result.outcome.as_str())
            .bind(&result.message)
            .bind(result.error.as_ref().map(|e| e.code.as_str()))
            .bind(result.error.as_ref().map(|e| e.details.as_str()))
            .bind(result.sent_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.id))]
    async fn save(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO messages (id, channel_ids, variables, overrides, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id.as_str())
        .bind(message.channel_ids().iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>())
        .bind(Json(&message.variables))
        .bind(Json(&message.overrides))
        .bind(message.status().as_str())
        .bind(message.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StorageError::Conflict(format!("message {} already exists", message.id)));
            }
            Err(e) => return Err(StorageError::Database(e)),
        }

        Self::insert_results(&mut *tx, message).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.id, status = %message.status()))]
    async fn update(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE messages SET status = $2, persisted_at = NOW() WHERE id = $1")
            .bind(message.id.as_str())
            .bind(message.status().as_str())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::MessageNotFound(message.id.clone()));
        }

        sqlx::query("DELETE FROM message_results WHERE message_id = $1")
            .bind(message.id.as_str())
            .execute(&mut *tx)
            .await?;
        Self::insert_results(&mut *tx, message).await?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(message_id = %id))]
    async fn find_by_id(&self, id: &MessageId) -> Result<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, channel_ids, variables, overrides, created_at FROM messages WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::MessageNotFound(id.clone()))?;

        let results = sqlx::query_as::<_, MessageResultRecord>(
            r#"
            SELECT channel_id, outcome, message, error_code, error_details, sent_at
            FROM message_results
            WHERE message_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        record.into_message(results)
    }
}
