mod cache;
pub mod config;
mod error;
mod events;
mod realtime;
mod status_store;
mod sweeper;
mod worker;

pub use cache::{LocalCache, status_key};
pub use config::PainelConfig;
pub use error::WorkerError;
pub use events::WorkerEvent;
pub use realtime::{RealtimeEvent, RealtimeSubscription};
pub use status_store::{StatusLookup, StatusSource, StatusStore};
pub use sweeper::{AutoResolveSweeper, SweeperHandle};
pub use worker::PainelWorker;

pub use painel_core::{
    ChannelRef, Conversation, ConversationStatus, ConversationView, MessageRole, StatusCounts,
    ThreadMessage, format_phone_number,
};
pub use painel_db::{MessageRow, PainelDb};
