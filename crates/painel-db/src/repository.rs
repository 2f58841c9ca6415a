use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use painel_core::{ConversationStatus, StatusCounts, is_valid_table_name};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::broadcast;

use crate::error::{DbError, Result};
use crate::events::ChangeEvent;
use crate::models::{MessageRow, NewMessage, StatusRow};
use crate::schema::{STATUS_SCHEMA, message_table_schema};

const CHANGE_FEED_CAPACITY: usize = 1024;
/// Ids bound per `UPDATE`, well under SQLite's host parameter limit.
const MARK_READ_CHUNK: usize = 500;

pub struct PainelDb {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl PainelDb {
    pub async fn new() -> Result<Self> {
        let db_path = Self::default_path()?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self::new_with_path(&db_path).await?;
        tracing::info!("Database initialized at: {}", db_path.display());
        Ok(db)
    }

    pub async fn new_with_path(path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        sqlx::raw_sql(STATUS_SCHEMA).execute(&pool).await?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self { pool, changes })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com.br", "painel", "painel").ok_or(DbError::DataDirNotFound)?;
        Ok(dirs.data_dir().join("painel.db"))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create a channel's message table if it does not exist yet.
    pub async fn ensure_message_table(&self, table: &str) -> Result<()> {
        let table = checked_table(table)?;
        sqlx::raw_sql(&message_table_schema(table))
            .execute(&self.pool)
            .await?;
        tracing::debug!(table, "Message table ready");
        Ok(())
    }

    /// Append a message and publish it on the change feed.
    pub async fn insert_message(&self, table: &str, message: &NewMessage) -> Result<MessageRow> {
        let table = checked_table(table)?;
        let sql = format!(
            "INSERT INTO {table} (session_id, message, nome_do_contato, created_at, is_read)
             VALUES (?, ?, ?, ?, 0)
             RETURNING *"
        );

        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(&message.session_id)
            .bind(&message.message)
            .bind(message.contact_name.as_deref())
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await?;

        // No subscribers is not an error.
        let _ = self.changes.send(ChangeEvent::Insert {
            table: table.to_string(),
            row: row.clone(),
        });

        Ok(row)
    }

    pub async fn get_messages(&self, table: &str) -> Result<Vec<MessageRow>> {
        let table = checked_table(table)?;
        let sql = format!("SELECT * FROM {table} ORDER BY created_at, id");

        Ok(sqlx::query_as::<_, MessageRow>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Mark the given rows as read. Rows already read keep their `read_at`.
    pub async fn mark_read(&self, table: &str, ids: &[i64], read_at: i64) -> Result<u64> {
        let table = checked_table(table)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut marked = 0;

        for chunk in ids.chunks(MARK_READ_CHUNK) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("UPDATE {table} SET is_read = 1, read_at = "));
            query.push_bind(read_at);
            query.push(" WHERE is_read = 0 AND id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            marked += query.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(marked)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub async fn get_status(
        &self,
        channel_id: &str,
        conversation_id: &str,
    ) -> Result<Option<StatusRow>> {
        Ok(sqlx::query_as::<_, StatusRow>(
            "SELECT * FROM conversation_status WHERE channel_id = ? AND conversation_id = ?",
        )
        .bind(channel_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_statuses(&self, channel_id: &str) -> Result<Vec<StatusRow>> {
        Ok(sqlx::query_as::<_, StatusRow>(
            "SELECT * FROM conversation_status WHERE channel_id = ? ORDER BY updated_at DESC",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Insert or update the status row for a conversation. Last write wins.
    pub async fn upsert_status(
        &self,
        channel_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
        now: i64,
    ) -> Result<StatusRow> {
        Ok(sqlx::query_as::<_, StatusRow>(
            r#"INSERT INTO conversation_status (channel_id, conversation_id, status, updated_at, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(channel_id, conversation_id) DO UPDATE SET
                 status = excluded.status,
                 updated_at = excluded.updated_at
               RETURNING *"#,
        )
        .bind(channel_id)
        .bind(conversation_id)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn status_counts(&self, channel_id: &str) -> Result<StatusCounts> {
        let (total, pending, in_progress, resolved): (i64, i64, i64, i64) = sqlx::query_as(
            r#"SELECT
                 COUNT(*),
                 COALESCE(SUM(CASE WHEN status = 'unread' THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0)
               FROM conversation_status WHERE channel_id = ?"#,
        )
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StatusCounts {
            total: total as u64,
            pending: pending as u64,
            in_progress: in_progress as u64,
            resolved: resolved as u64,
        })
    }

    /// Resolve every non-resolved row last updated before `cutoff`, in one statement.
    pub async fn resolve_stale(&self, cutoff: i64, now: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE conversation_status SET status = 'resolved', updated_at = ?
             WHERE updated_at < ? AND status != 'resolved'",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn checked_table(table: &str) -> Result<&str> {
    if is_valid_table_name(table) {
        Ok(table)
    } else {
        Err(DbError::InvalidTable(table.to_string()))
    }
}
