use chrono::{DateTime, Utc};
use painel_core::{RawMessage, StatusRecord};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub message: String,
    #[sqlx(rename = "nome_do_contato")]
    pub contact_name: Option<String>,
    pub created_at: i64,
    pub read_at: Option<i64>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusRow {
    pub channel_id: String,
    pub conversation_id: String,
    pub status: String,
    pub updated_at: i64,
    pub created_at: i64,
}

/// A message about to be appended to a channel table.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub message: String,
    pub contact_name: Option<String>,
    pub created_at: i64,
}

impl From<MessageRow> for RawMessage {
    fn from(row: MessageRow) -> Self {
        RawMessage {
            id: row.id,
            session_id: row.session_id,
            message: row.message,
            contact_name: row.contact_name,
            created_at: from_timestamp(row.created_at),
            is_read: row.is_read,
            read_at: row.read_at.map(from_timestamp),
        }
    }
}

impl TryFrom<StatusRow> for StatusRecord {
    type Error = DbError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        Ok(StatusRecord {
            status: row.status.parse()?,
            channel_id: row.channel_id,
            conversation_id: row.conversation_id,
            updated_at: from_timestamp(row.updated_at),
            created_at: from_timestamp(row.created_at),
        })
    }
}

pub fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
