use crate::domain::{
    ChannelId, ChannelOverride, ErrorCode, Message, MessageId, MessageResult, ResultError, ResultOutcome, Variables,
};
use crate::storage::StorageError;
use sqlx::types::Json;
use std::collections::BTreeMap;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: String,
    pub(crate) channel_ids: Vec<String>,
    pub(crate) variables: Json<Variables>,
    pub(crate) overrides: Json<BTreeMap<ChannelId, ChannelOverride>>,
    pub(crate) created_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageResultRecord {
    pub(crate) channel_id: String,
    pub(crate) outcome: String,
    pub(crate) message: String,
    pub(crate) error_code: Option<String>,
    pub(crate) error_details: Option<String>,
    pub(crate) sent_at: Option<i64>,
}

impl TryFrom<MessageResultRecord> for MessageResult {
    type Error = StorageError;

    fn try_from(record: MessageResultRecord) -> Result<Self, Self::Error> {
        let outcome = match record.outcome.as_str() {
            "success" => ResultOutcome::Success,
            "failed" => ResultOutcome::Failed,
            other => return Err(StorageError::Corrupt(format!("unknown outcome '{other}'"))),
        };
        let error = record
            .error_code
            .map(|code| {
                code.parse::<ErrorCode>()
                    .map(|code| ResultError { code, details: record.error_details.unwrap_or_default() })
                    .map_err(StorageError::Corrupt)
            })
            .transpose()?;
        Ok(Self { channel_id: ChannelId::new(record.channel_id), outcome, message: record.message, error, sent_at: record.sent_at })
    }
}

impl MessageRecord {
    /// Rebuilds the aggregate; `results` must already be in position order.
    pub(crate) fn into_message(self, results: Vec<MessageResultRecord>) -> Result<Message, StorageError> {
        let results = results.into_iter().map(MessageResult::try_from).collect::<Result<Vec<_>, _>>()?;
        Message::restore(
            MessageId::new(self.id),
            self.channel_ids.into_iter().map(ChannelId::new).collect(),
            self.variables.0,
            self.overrides.0,
            results,
            self.created_at,
        )
        .map_err(|e| StorageError::Corrupt(e.to_string()))
    }
}
