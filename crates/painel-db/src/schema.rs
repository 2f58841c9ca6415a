pub const STATUS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_status (
    channel_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'unread'
        CHECK (status IN ('unread', 'in_progress', 'resolved')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE(channel_id, conversation_id)
);

CREATE INDEX IF NOT EXISTS idx_conversation_status_channel ON conversation_status(channel_id);
CREATE INDEX IF NOT EXISTS idx_conversation_status_updated ON conversation_status(status, updated_at);
"#;

/// Schema of a per-channel message table. `table` must already be validated.
pub fn message_table_schema(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    message TEXT NOT NULL,
    nome_do_contato TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    read_at INTEGER,
    is_read INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_{table}_session ON {table}(session_id);
CREATE INDEX IF NOT EXISTS idx_{table}_created ON {table}(created_at);
"#
    )
}
