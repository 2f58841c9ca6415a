//! Conversation status backed by the shared `conversation_status` table and
//! mirrored into the [`LocalCache`].
//!
//! The table is the source of truth. The cache only answers when the table
//! has no row or cannot be reached, and absence everywhere means `unread`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use painel_core::{ConversationStatus, StatusCounts, StatusRecord};
use painel_db::PainelDb;

use crate::cache::LocalCache;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Backend,
    Cache,
    /// Neither the table nor the cache had a value.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLookup {
    pub status: ConversationStatus,
    pub source: StatusSource,
    /// Whether the table read itself failed, as opposed to finding no row.
    pub backend_unavailable: bool,
}

#[derive(Clone)]
pub struct StatusStore {
    db: Arc<PainelDb>,
    cache: Arc<LocalCache>,
}

impl StatusStore {
    pub fn new(db: Arc<PainelDb>, cache: Arc<LocalCache>) -> Self {
        Self { db, cache }
    }

    pub async fn get_status(&self, channel_id: &str, conversation_id: &str) -> ConversationStatus {
        self.lookup(channel_id, conversation_id).await.status
    }

    pub async fn lookup(&self, channel_id: &str, conversation_id: &str) -> StatusLookup {
        let mut backend_unavailable = false;

        match self.db.get_status(channel_id, conversation_id).await {
            Ok(Some(row)) => match StatusRecord::try_from(row) {
                Ok(record) => {
                    self.cache.set_status(channel_id, conversation_id, record.status);
                    return StatusLookup {
                        status: record.status,
                        source: StatusSource::Backend,
                        backend_unavailable,
                    };
                }
                Err(e) => {
                    tracing::warn!(channel_id, conversation_id, error = %e, "Stored status is invalid");
                }
            },
            Ok(None) => {}
            Err(e) => {
                backend_unavailable = true;
                tracing::warn!(channel_id, conversation_id, error = %e, "Status read failed, using local cache");
            }
        }

        match self.cache.get_status(channel_id, conversation_id) {
            Some(status) => StatusLookup {
                status,
                source: StatusSource::Cache,
                backend_unavailable,
            },
            None => StatusLookup {
                status: ConversationStatus::Unread,
                source: StatusSource::Default,
                backend_unavailable,
            },
        }
    }

    /// Record a new status. Returns `false` if the table write failed.
    ///
    /// The cache is updated first so the next local read reflects the agent's
    /// choice immediately. It is not rolled back when the table write fails.
    pub async fn set_status(
        &self,
        channel_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> bool {
        self.cache.set_status(channel_id, conversation_id, status);

        match self
            .db
            .upsert_status(channel_id, conversation_id, status, Utc::now().timestamp())
            .await
        {
            Ok(_) => {
                tracing::info!(channel_id, conversation_id, status = %status, "Conversation status updated");
                true
            }
            Err(e) => {
                tracing::error!(channel_id, conversation_id, status = %status, error = %e, "Failed to update conversation status");
                false
            }
        }
    }

    pub async fn status_counts(&self, channel_id: &str) -> Result<StatusCounts> {
        Ok(self.db.status_counts(channel_id).await?)
    }

    /// Statuses for many conversations of one channel with a single table read.
    pub async fn statuses_for<'a>(
        &self,
        channel_id: &str,
        conversation_ids: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, ConversationStatus> {
        let stored: HashMap<String, ConversationStatus> = match self.db.list_statuses(channel_id).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| {
                    let status = row.status.parse().ok()?;
                    Some((row.conversation_id, status))
                })
                .collect(),
            Err(e) => {
                tracing::warn!(channel_id, error = %e, "Status list failed, using local cache");
                HashMap::new()
            }
        };

        conversation_ids
            .into_iter()
            .map(|id| {
                let status = stored
                    .get(id)
                    .copied()
                    .or_else(|| self.cache.get_status(channel_id, id))
                    .unwrap_or_default();
                (id.to_string(), status)
            })
            .collect()
    }
}
