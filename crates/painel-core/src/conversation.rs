//! Derivation of conversations from the append-only message log.
//!
//! A conversation is never stored. It is recomputed from every row whose
//! session id yields the same phone key.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::{MessageRole, ParsedMessage, parse_payload};
use crate::phone::extract_phone;
use crate::status::ConversationStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub session_id: String,
    /// Structured payload, see [`parse_payload`]
    pub message: String,
    pub contact_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub phone_key: String,
    pub channel_id: String,
    pub contact_name: String,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub last_message_role: MessageRole,
    pub message_count: usize,
    pub unread_count: usize,
}

/// A conversation together with its current status, as shown in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub status: ConversationStatus,
}

/// One entry of a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

type Entry<'a> = (&'a RawMessage, ParsedMessage);

/// Group raw rows into one [`Conversation`] per phone key.
///
/// Rows whose payload fails to parse are dropped before grouping, so they
/// never create a conversation nor affect its name or last message. Output
/// order is unspecified; see [`sort_by_recent`].
pub fn derive_conversations(channel_id: &str, messages: &[RawMessage]) -> Vec<Conversation> {
    let mut groups: HashMap<String, Vec<Entry<'_>>> = HashMap::new();

    for raw in messages {
        match parse_payload(&raw.message) {
            Ok(parsed) => groups
                .entry(extract_phone(&raw.session_id))
                .or_default()
                .push((raw, parsed)),
            Err(e) => {
                tracing::debug!(message_id = raw.id, error = %e, "Skipping unparseable message");
            }
        }
    }

    groups
        .into_iter()
        .filter_map(|(phone_key, entries)| summarize(channel_id, phone_key, entries))
        .collect()
}

fn summarize(channel_id: &str, phone_key: String, mut entries: Vec<Entry<'_>>) -> Option<Conversation> {
    // Oldest first; equal timestamps fall back to row id so the later insert wins.
    entries.sort_by_key(|(raw, _)| (raw.created_at, raw.id));

    let contact_name = entries
        .iter()
        .rev()
        .filter_map(|(raw, _)| raw.contact_name.as_deref())
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| phone_key.clone());

    let unread_count = entries.iter().filter(|(raw, _)| !raw.is_read).count();
    let message_count = entries.len();
    let (last_raw, last_parsed) = entries.pop()?;

    Some(Conversation {
        phone_key,
        channel_id: channel_id.to_string(),
        contact_name,
        last_message: last_parsed.content,
        last_message_time: last_raw.created_at,
        last_message_role: last_parsed.role,
        message_count,
        unread_count,
    })
}

/// Chronological history of one conversation, skipping unparseable rows.
pub fn thread_messages(phone_key: &str, messages: &[RawMessage]) -> Vec<ThreadMessage> {
    let mut thread: Vec<ThreadMessage> = messages
        .iter()
        .filter(|raw| extract_phone(&raw.session_id) == phone_key)
        .filter_map(|raw| {
            let parsed = parse_payload(&raw.message).ok()?;
            Some(ThreadMessage {
                id: raw.id,
                role: parsed.role,
                content: parsed.content,
                created_at: raw.created_at,
                is_read: raw.is_read,
            })
        })
        .collect();

    thread.sort_by_key(|msg| (msg.created_at, msg.id));
    thread
}

/// Most recent conversation first; ties broken by phone key.
pub fn recent_first(a: &Conversation, b: &Conversation) -> Ordering {
    b.last_message_time
        .cmp(&a.last_message_time)
        .then_with(|| a.phone_key.cmp(&b.phone_key))
}

pub fn sort_by_recent(conversations: &mut [Conversation]) {
    conversations.sort_by(recent_first);
}
