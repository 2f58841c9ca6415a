use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use painel_core::{
    ChannelMap, ChannelRef, ConversationStatus, ConversationView, MessageRole, ParsedMessage,
    RawMessage, StatusCounts, ThreadMessage, derive_conversations, extract_phone, parse_payload,
    recent_first, thread_messages,
};
use painel_db::{MessageRow, NewMessage, PainelDb};

use crate::cache::LocalCache;
use crate::config::PainelConfig;
use crate::error::Result;
use crate::events::WorkerEvent;
use crate::realtime::{RealtimeEvent, RealtimeSubscription};
use crate::status_store::{StatusLookup, StatusStore};
use crate::sweeper::{AutoResolveSweeper, SweeperHandle};

const EVENT_QUEUE_CAPACITY: usize = 1000;
const REFRESH_QUEUE_CAPACITY: usize = 64;

pub struct PainelWorker {
    db: Arc<PainelDb>,
    channels: Arc<ChannelMap>,
    statuses: StatusStore,
    sweeper: AutoResolveSweeper,
    sweeper_enabled: bool,
    sweeper_handle: Mutex<Option<SweeperHandle>>,
    watch: Mutex<Option<ChannelWatch>>,
    event_tx: mpsc::Sender<WorkerEvent>,
    event_rx: Option<mpsc::Receiver<WorkerEvent>>,
}

impl PainelWorker {
    pub async fn new(config: &PainelConfig) -> Result<Self> {
        let db = match &config.database.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                PainelDb::new_with_path(path).await?
            }
            None => PainelDb::new().await?,
        };
        let cache = LocalCache::open(&config.cache_path()?);

        Self::with_parts(Arc::new(db), Arc::new(cache), config).await
    }

    pub async fn with_parts(
        db: Arc<PainelDb>,
        cache: Arc<LocalCache>,
        config: &PainelConfig,
    ) -> Result<Self> {
        let channels = config.channel_map()?;
        for table in channels.tables() {
            db.ensure_message_table(table).await?;
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        Ok(Self {
            statuses: StatusStore::new(db.clone(), cache),
            sweeper: AutoResolveSweeper::new(db.clone(), &config.sweeper)?,
            sweeper_enabled: config.sweeper.enabled,
            sweeper_handle: Mutex::new(None),
            watch: Mutex::new(None),
            channels: Arc::new(channels),
            db,
            event_tx,
            event_rx: Some(event_rx),
        })
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<WorkerEvent>> {
        self.event_rx.take()
    }

    /// Start background work: the auto-resolve sweeper, when enabled.
    pub async fn start(&self) -> Result<()> {
        if !self.sweeper_enabled {
            tracing::info!("Auto-resolve sweeper disabled");
            return Ok(());
        }

        let mut handle = self.sweeper_handle.lock().await;
        if handle.as_ref().is_some_and(SweeperHandle::is_running) {
            return Ok(());
        }
        *handle = Some(self.sweeper.clone().start(Some(self.event_tx.clone())));
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(mut handle) = self.sweeper_handle.lock().await.take() {
            handle.cancel();
        }
        self.unwatch().await;
        Ok(())
    }

    pub fn channels(&self) -> &[ChannelRef] {
        self.channels.channels()
    }

    pub fn resolve_channel(&self, channel_id: &str) -> &ChannelRef {
        self.channels.resolve(channel_id)
    }

    /// Conversations of a channel, most recent first.
    pub async fn get_conversations(&self, channel_id: &str) -> Result<Vec<ConversationView>> {
        let channel = self.channels.resolve(channel_id);
        load_conversations(&self.db, &self.statuses, channel).await
    }

    pub async fn get_conversations_by_status(
        &self,
        channel_id: &str,
        status: ConversationStatus,
    ) -> Result<Vec<ConversationView>> {
        let mut conversations = self.get_conversations(channel_id).await?;
        conversations.retain(|view| view.status == status);
        Ok(conversations)
    }

    pub async fn get_conversation_messages(
        &self,
        channel_id: &str,
        phone_key: &str,
    ) -> Result<Vec<ThreadMessage>> {
        let channel = self.channels.resolve(channel_id);
        let messages = fetch_raw_messages(&self.db, channel).await?;
        Ok(thread_messages(phone_key, &messages))
    }

    pub async fn mark_conversation_read(&self, channel_id: &str, phone_key: &str) -> Result<u64> {
        let channel = self.channels.resolve(channel_id);
        let rows = self.db.get_messages(&channel.table_name).await?;

        let unread: Vec<i64> = rows
            .iter()
            .filter(|row| !row.is_read && extract_phone(&row.session_id) == phone_key)
            .map(|row| row.id)
            .collect();

        let marked = self
            .db
            .mark_read(&channel.table_name, &unread, Utc::now().timestamp())
            .await?;
        tracing::debug!(channel_id = %channel.id, phone_key, marked, "Conversation marked as read");
        Ok(marked)
    }

    /// Append an inbound message to the channel's table.
    pub async fn ingest_message(
        &self,
        channel_id: &str,
        session_id: &str,
        payload: &str,
        contact_name: Option<&str>,
    ) -> Result<MessageRow> {
        let channel = self.channels.resolve(channel_id);
        let row = self
            .db
            .insert_message(
                &channel.table_name,
                &NewMessage {
                    session_id: session_id.to_string(),
                    message: payload.to_string(),
                    contact_name: contact_name.map(str::to_string),
                    created_at: Utc::now().timestamp(),
                },
            )
            .await?;

        tracing::debug!(channel_id = %channel.id, message_id = row.id, "Message ingested");
        Ok(row)
    }

    /// Append a plain-text customer message.
    pub async fn receive_message(
        &self,
        channel_id: &str,
        session_id: &str,
        text: &str,
        contact_name: Option<&str>,
    ) -> Result<MessageRow> {
        let payload = ParsedMessage::new(MessageRole::Customer, text).to_payload();
        self.ingest_message(channel_id, session_id, &payload, contact_name)
            .await
    }

    /// Record an agent reply in the conversation.
    pub async fn send_reply(&self, channel_id: &str, phone_key: &str, text: &str) -> Result<MessageRow> {
        let payload = ParsedMessage::new(MessageRole::Agent, text).to_payload();
        self.ingest_message(channel_id, phone_key, &payload, None).await
    }

    pub async fn get_status(&self, channel_id: &str, conversation_id: &str) -> ConversationStatus {
        let channel = self.channels.resolve(channel_id);
        self.statuses.get_status(&channel.id, conversation_id).await
    }

    pub async fn lookup_status(&self, channel_id: &str, conversation_id: &str) -> StatusLookup {
        let channel = self.channels.resolve(channel_id);
        self.statuses.lookup(&channel.id, conversation_id).await
    }

    /// Returns `false` when the shared table could not be written.
    pub async fn set_status(
        &self,
        channel_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> bool {
        let channel = self.channels.resolve(channel_id);
        let ok = self.statuses.set_status(&channel.id, conversation_id, status).await;

        let event = if ok {
            WorkerEvent::StatusChanged {
                channel_id: channel.id.clone(),
                conversation_id: conversation_id.to_string(),
                status,
            }
        } else {
            WorkerEvent::StatusWriteFailed {
                channel_id: channel.id.clone(),
                conversation_id: conversation_id.to_string(),
                status,
            }
        };
        self.notify(event);
        ok
    }

    pub async fn get_status_counts(&self, channel_id: &str) -> Result<StatusCounts> {
        let channel = self.channels.resolve(channel_id);
        self.statuses.status_counts(&channel.id).await
    }

    pub async fn sweep_now(&self) -> Result<u64> {
        let resolved = self.sweeper.sweep().await?;
        self.notify(WorkerEvent::SweepCompleted { resolved });
        Ok(resolved)
    }

    /// Follow inserts on a channel and publish recomputed conversations.
    ///
    /// Only one channel is watched at a time; watching another one tears the
    /// previous subscription down.
    pub async fn watch_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.channels.resolve(channel_id).clone();
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_CAPACITY);

        let mut subscription = RealtimeSubscription::new(self.db.clone(), channel.table_name.clone());
        subscription.start(move |event| {
            // A full queue already guarantees another recompute.
            if let Err(e) = refresh_tx.try_send(event) {
                tracing::debug!(error = %e, "Refresh queue full, coalescing insert");
            }
        });

        tracing::info!(channel_id = %channel.id, table = subscription.table(), "Watching channel");

        let refresh_task = tokio::spawn(refresh_loop(
            self.db.clone(),
            self.statuses.clone(),
            channel,
            refresh_rx,
            self.event_tx.clone(),
        ));

        *self.watch.lock().await = Some(ChannelWatch {
            _subscription: subscription,
            refresh_task,
        });
        Ok(())
    }

    pub async fn unwatch(&self) {
        if self.watch.lock().await.take().is_some() {
            tracing::info!("Stopped watching channel");
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.watch.lock().await.is_some()
    }

    fn notify(&self, event: WorkerEvent) {
        offer(&self.event_tx, event);
    }
}

/// Deliver without waiting; a slow or absent consumer loses events instead of
/// stalling the sender.
fn offer(event_tx: &mpsc::Sender<WorkerEvent>, event: WorkerEvent) {
    if let Err(e) = event_tx.try_send(event) {
        tracing::debug!(error = %e, "Dropping worker event");
    }
}

struct ChannelWatch {
    _subscription: RealtimeSubscription,
    refresh_task: JoinHandle<()>,
}

impl Drop for ChannelWatch {
    fn drop(&mut self) {
        self.refresh_task.abort();
    }
}

async fn fetch_raw_messages(db: &PainelDb, channel: &ChannelRef) -> Result<Vec<RawMessage>> {
    let rows = db.get_messages(&channel.table_name).await?;
    Ok(rows.into_iter().map(RawMessage::from).collect())
}

async fn load_conversations(
    db: &PainelDb,
    statuses: &StatusStore,
    channel: &ChannelRef,
) -> Result<Vec<ConversationView>> {
    let messages = fetch_raw_messages(db, channel).await?;
    let conversations = derive_conversations(&channel.id, &messages);

    let status_map = statuses
        .statuses_for(&channel.id, conversations.iter().map(|c| c.phone_key.as_str()))
        .await;

    let mut views: Vec<ConversationView> = conversations
        .into_iter()
        .map(|conversation| ConversationView {
            status: status_map
                .get(&conversation.phone_key)
                .copied()
                .unwrap_or_default(),
            conversation,
        })
        .collect();

    views.sort_by(|a, b| recent_first(&a.conversation, &b.conversation));
    Ok(views)
}

/// Full re-fetch and regroup of the channel for every batch of inserts.
async fn refresh_loop(
    db: Arc<PainelDb>,
    statuses: StatusStore,
    channel: ChannelRef,
    mut refresh_rx: mpsc::Receiver<RealtimeEvent>,
    event_tx: mpsc::Sender<WorkerEvent>,
) {
    publish_conversations(&db, &statuses, &channel, &event_tx).await;

    while let Some(event) = refresh_rx.recv().await {
        announce(&channel, &event, &event_tx);

        // Coalesce a burst of inserts into one recompute.
        while let Ok(event) = refresh_rx.try_recv() {
            announce(&channel, &event, &event_tx);
        }

        publish_conversations(&db, &statuses, &channel, &event_tx).await;
    }
}

fn announce(channel: &ChannelRef, event: &RealtimeEvent, event_tx: &mpsc::Sender<WorkerEvent>) {
    if let RealtimeEvent::Inserted(row) = event {
        offer(
            event_tx,
            WorkerEvent::NewMessage {
                channel_id: channel.id.clone(),
                phone_key: extract_phone(&row.session_id),
                content: parse_payload(&row.message).ok().map(|parsed| parsed.content),
                timestamp: row.created_at,
            },
        );
    }
}

async fn publish_conversations(
    db: &PainelDb,
    statuses: &StatusStore,
    channel: &ChannelRef,
    event_tx: &mpsc::Sender<WorkerEvent>,
) {
    let event = match load_conversations(db, statuses, channel).await {
        Ok(conversations) => WorkerEvent::ConversationsUpdated {
            channel_id: channel.id.clone(),
            conversations,
        },
        Err(e) => {
            tracing::error!(channel_id = %channel.id, error = %e, "Failed to recompute conversations");
            WorkerEvent::Error {
                channel_id: Some(channel.id.clone()),
                error: e.to_string(),
            }
        }
    };
    offer(event_tx, event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    const CANARANA: &str = "b2e8f4a1-7c3d-4e9f-a6b5-1d2c3e4f5a6b";

    async fn worker() -> (TempDir, PainelWorker) {
        let dir = tempdir().unwrap();
        let db = PainelDb::new_with_path(&dir.path().join("painel.db"))
            .await
            .unwrap();
        let config = load_config_from_str("[sweeper]\nenabled = false").unwrap();
        let worker = PainelWorker::with_parts(Arc::new(db), Arc::new(LocalCache::in_memory()), &config)
            .await
            .unwrap();
        (dir, worker)
    }

    fn human(content: &str) -> String {
        ParsedMessage::new(MessageRole::Customer, content).to_payload()
    }

    async fn next_matching<F>(rx: &mut mpsc::Receiver<WorkerEvent>, pred: F) -> WorkerEvent
    where
        F: Fn(&WorkerEvent) -> bool,
    {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for worker event")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_conversations_from_ingested_messages() {
        let (_dir, worker) = worker().await;

        worker
            .ingest_message("canarana", "5511999998888-a", &human("Oi"), Some("João"))
            .await
            .unwrap();
        worker
            .ingest_message("canarana", "5566911112222-b", &human("Bom dia"), None)
            .await
            .unwrap();
        worker
            .ingest_message("canarana", "5511999998888-c", "corrupted", Some("Outro Nome"))
            .await
            .unwrap();

        let conversations = worker.get_conversations(CANARANA).await.unwrap();
        assert_eq!(conversations.len(), 2);

        let joao = conversations
            .iter()
            .find(|view| view.conversation.phone_key == "5511999998888")
            .unwrap();
        assert_eq!(joao.conversation.contact_name, "João");
        assert_eq!(joao.conversation.channel_id, CANARANA);
        assert_eq!(joao.conversation.message_count, 1);
        assert_eq!(joao.status, ConversationStatus::Unread);
    }

    #[tokio::test]
    async fn test_slug_and_uuid_share_status() {
        let (_dir, worker) = worker().await;

        assert!(worker.set_status("canarana", "5511999998888", ConversationStatus::InProgress).await);
        assert_eq!(
            worker.get_status(CANARANA, "5511999998888").await,
            ConversationStatus::InProgress
        );
        assert_eq!(worker.get_status_counts(CANARANA).await.unwrap().in_progress, 1);
    }

    #[tokio::test]
    async fn test_status_shows_up_in_conversation_list() {
        let (_dir, worker) = worker().await;
        worker
            .ingest_message("canarana", "5511999998888", &human("Oi"), None)
            .await
            .unwrap();
        worker
            .set_status("canarana", "5511999998888", ConversationStatus::Resolved)
            .await;

        let resolved = worker
            .get_conversations_by_status("canarana", ConversationStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);

        let unread = worker
            .get_conversations_by_status("canarana", ConversationStatus::Unread)
            .await
            .unwrap();
        assert!(unread.is_empty());
    }

    #[tokio::test]
    async fn test_history_and_mark_read() {
        let (_dir, worker) = worker().await;
        worker
            .ingest_message("canarana", "5511999998888", &human("Preciso de ajuda"), None)
            .await
            .unwrap();
        worker
            .send_reply("canarana", "5511999998888", "Claro, em que posso ajudar?")
            .await
            .unwrap();

        let history = worker
            .get_conversation_messages("canarana", "5511999998888")
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::Customer);
        assert_eq!(history[1].role, MessageRole::Agent);

        assert_eq!(worker.mark_conversation_read("canarana", "5511999998888").await.unwrap(), 2);
        let conversations = worker.get_conversations("canarana").await.unwrap();
        assert_eq!(conversations[0].conversation.unread_count, 0);
    }

    #[tokio::test]
    async fn test_set_status_emits_event() {
        let (_dir, mut worker) = worker().await;
        let mut rx = worker.take_event_receiver().unwrap();

        worker
            .set_status("canarana", "5511999998888", ConversationStatus::InProgress)
            .await;

        let event = next_matching(&mut rx, |e| matches!(e, WorkerEvent::StatusChanged { .. })).await;
        if let WorkerEvent::StatusChanged { channel_id, status, .. } = event {
            assert_eq!(channel_id, CANARANA);
            assert_eq!(status, ConversationStatus::InProgress);
        }
    }

    #[tokio::test]
    async fn test_watch_recomputes_on_insert() {
        let (_dir, mut worker) = worker().await;
        let mut rx = worker.take_event_receiver().unwrap();

        worker.watch_channel("canarana").await.unwrap();
        assert!(worker.is_watching().await);

        // initial snapshot
        let initial = next_matching(&mut rx, |e| matches!(e, WorkerEvent::ConversationsUpdated { .. })).await;
        if let WorkerEvent::ConversationsUpdated { conversations, .. } = initial {
            assert!(conversations.is_empty());
        }

        worker
            .ingest_message("canarana", "5511999998888-x", &human("Chegou agora"), Some("Ana"))
            .await
            .unwrap();

        let updated = next_matching(&mut rx, |e| {
            matches!(e, WorkerEvent::ConversationsUpdated { conversations, .. } if !conversations.is_empty())
        })
        .await;
        if let WorkerEvent::ConversationsUpdated { channel_id, conversations } = updated {
            assert_eq!(channel_id, CANARANA);
            assert_eq!(conversations[0].conversation.phone_key, "5511999998888");
            assert_eq!(conversations[0].conversation.last_message, "Chegou agora");
        }

        worker.unwatch().await;
        assert!(!worker.is_watching().await);
    }

    #[tokio::test]
    async fn test_refresh_loop_keeps_running_when_events_are_not_drained() {
        let (_dir, worker) = worker().await;
        let channel = worker.resolve_channel("canarana").clone();

        let mut inserted = Vec::new();
        for i in 0..5 {
            let row = worker
                .ingest_message("canarana", "5511999998888", &human(&format!("msg {}", i)), None)
                .await
                .unwrap();
            inserted.push(row);
        }

        // Room for a single event that nobody ever reads.
        let (event_tx, _event_rx) = mpsc::channel(1);
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_CAPACITY);
        for row in inserted {
            refresh_tx.try_send(RealtimeEvent::Inserted(row)).unwrap();
        }
        refresh_tx.try_send(RealtimeEvent::Missed(3)).unwrap();
        drop(refresh_tx);

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            refresh_loop(worker.db.clone(), worker.statuses.clone(), channel, refresh_rx, event_tx),
        )
        .await;
        assert!(finished.is_ok(), "refresh loop blocked on a full event queue");
    }

    #[tokio::test]
    async fn test_watch_survives_undrained_event_queue() {
        let (_dir, mut worker) = worker().await;
        let mut rx = worker.take_event_receiver().unwrap();
        worker.watch_channel("canarana").await.unwrap();

        // Far more inserts than the event queue holds, with nobody reading.
        for i in 0..(EVENT_QUEUE_CAPACITY + 200) {
            worker
                .ingest_message("canarana", "5566911112222", &human(&format!("burst {}", i)), None)
                .await
                .unwrap();
        }
        while rx.try_recv().is_ok() {}

        worker
            .ingest_message("canarana", "5511999998888", &human("depois do pico"), None)
            .await
            .unwrap();

        next_matching(&mut rx, |e| {
            matches!(e, WorkerEvent::ConversationsUpdated { conversations, .. }
                if conversations.iter().any(|view| view.conversation.last_message == "depois do pico"))
        })
        .await;
        assert!(worker.is_watching().await);
    }

    #[tokio::test]
    async fn test_sweep_now() {
        let (_dir, worker) = worker().await;
        worker
            .db
            .upsert_status(
                CANARANA,
                "5511999998888",
                ConversationStatus::InProgress,
                (Utc::now() - chrono::Duration::hours(25)).timestamp(),
            )
            .await
            .unwrap();

        assert_eq!(worker.sweep_now().await.unwrap(), 1);
        assert_eq!(
            worker.get_status(CANARANA, "5511999998888").await,
            ConversationStatus::Resolved
        );
    }
}
