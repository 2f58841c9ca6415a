//! Insert notifications for one channel table.
//!
//! Events are delivered in the order the table received them. Nothing is
//! guaranteed across tables.

use std::sync::Arc;

use painel_core::extract_phone;
use painel_db::{ChangeEvent, MessageRow, PainelDb};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Inserted(MessageRow),
    /// The subscriber fell behind and this many events were dropped.
    Missed(u64),
}

pub struct RealtimeSubscription {
    db: Arc<PainelDb>,
    table: String,
    phone_filter: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    pub fn new(db: Arc<PainelDb>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
            phone_filter: None,
            task: None,
        }
    }

    /// Only deliver inserts whose session id yields this phone key.
    pub fn with_phone_filter(mut self, phone_key: impl Into<String>) -> Self {
        self.phone_filter = Some(phone_key.into());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Begin delivering events to `on_event`. Restarting replaces the previous listener.
    pub fn start<F>(&mut self, on_event: F)
    where
        F: Fn(RealtimeEvent) + Send + 'static,
    {
        self.cancel();

        // Subscribe before spawning so inserts right after `start` are not lost.
        let mut rx = self.db.subscribe();
        let table = self.table.clone();
        let phone_filter = self.phone_filter.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.table() != table {
                            continue;
                        }
                        let ChangeEvent::Insert { row, .. } = event;
                        if let Some(phone) = &phone_filter {
                            if extract_phone(&row.session_id) != *phone {
                                continue;
                            }
                        }
                        on_event(RealtimeEvent::Inserted(row));
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(table, missed, "Realtime subscriber lagged");
                        on_event(RealtimeEvent::Missed(missed));
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!(table, "Change feed closed");
                        break;
                    }
                }
            }
        }));

        tracing::debug!(table = %self.table, "Realtime subscription started");
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(table = %self.table, "Realtime subscription cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use painel_db::NewMessage;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use tokio::sync::mpsc;

    async fn db() -> (TempDir, Arc<PainelDb>) {
        let dir = tempdir().unwrap();
        let db = PainelDb::new_with_path(&dir.path().join("painel.db"))
            .await
            .unwrap();
        db.ensure_message_table("chat_a").await.unwrap();
        db.ensure_message_table("chat_b").await.unwrap();
        (dir, Arc::new(db))
    }

    fn message(session_id: &str) -> NewMessage {
        NewMessage {
            session_id: session_id.to_string(),
            message: r#"{"type":"human","content":"oi"}"#.to_string(),
            contact_name: None,
            created_at: 100,
        }
    }

    fn listen(sub: &mut RealtimeSubscription) -> mpsc::UnboundedReceiver<RealtimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        sub.start(move |event| {
            let _ = tx.send(event);
        });
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> Option<RealtimeEvent> {
        tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_delivers_inserts_for_its_table_only() {
        let (_dir, db) = db().await;
        let mut sub = RealtimeSubscription::new(db.clone(), "chat_a");
        assert_eq!(sub.table(), "chat_a");
        let mut rx = listen(&mut sub);

        db.insert_message("chat_b", &message("5511999998888")).await.unwrap();
        let row = db.insert_message("chat_a", &message("5511999998888")).await.unwrap();

        match next(&mut rx).await {
            Some(RealtimeEvent::Inserted(delivered)) => assert_eq!(delivered.id, row.id),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_phone_filter() {
        let (_dir, db) = db().await;
        let mut sub = RealtimeSubscription::new(db.clone(), "chat_a").with_phone_filter("5511999998888");
        let mut rx = listen(&mut sub);

        db.insert_message("chat_a", &message("5566911112222-x")).await.unwrap();
        db.insert_message("chat_a", &message("5511999998888-y")).await.unwrap();

        match next(&mut rx).await {
            Some(RealtimeEvent::Inserted(row)) => assert_eq!(row.session_id, "5511999998888-y"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let (_dir, db) = db().await;
        let mut sub = RealtimeSubscription::new(db.clone(), "chat_a");
        let mut rx = listen(&mut sub);
        assert!(sub.is_active());

        sub.cancel();
        assert!(!sub.is_active());

        db.insert_message("chat_a", &message("5511999998888")).await.unwrap();
        assert!(next(&mut rx).await.is_none());
    }
}
