use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a conversation.
///
/// Any state may move to any other by agent action. The only automatic
/// transition is the auto-resolve sweep, which moves stale conversations to
/// [`ConversationStatus::Resolved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Unread,
    InProgress,
    Resolved,
}

impl ConversationStatus {
    pub const ALL: [ConversationStatus; 3] = [Self::Unread, Self::InProgress, Self::Resolved];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unread => "Pendente",
            Self::InProgress => "Em andamento",
            Self::Resolved => "Resolvido",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unread" => Ok(Self::Unread),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted status row. Absence of a record means [`ConversationStatus::Unread`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub channel_id: String,
    pub conversation_id: String,
    pub status: ConversationStatus,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: u64,
    /// Conversations still `unread`
    pub pending: u64,
    pub in_progress: u64,
    pub resolved: u64,
}
