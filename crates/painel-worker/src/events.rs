use painel_core::{ConversationStatus, ConversationView};

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    ConversationsUpdated { channel_id: String, conversations: Vec<ConversationView> },
    NewMessage { channel_id: String, phone_key: String, content: Option<String>, timestamp: i64 },
    StatusChanged { channel_id: String, conversation_id: String, status: ConversationStatus },
    StatusWriteFailed { channel_id: String, conversation_id: String, status: ConversationStatus },
    SweepCompleted { resolved: u64 },
    Error { channel_id: Option<String>, error: String },
}
