//! Parsing of the structured `message` column.
//!
//! Rows store a chat-memory JSON object such as
//! `{"type": "human", "content": "Oi, tudo bem?"}`. Older rows nest the text
//! under `data.content`. Anything else is a [`ParseFailure`] and never
//! reaches the conversation view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Sent by the customer (`"human"`)
    Customer,
    /// Sent by the bot (`"ai"`)
    Assistant,
    /// Sent by a human agent from the dashboard
    Agent,
    System,
    Other(String),
}

impl MessageRole {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "human" | "user" => Self::Customer,
            "ai" | "assistant" => Self::Assistant,
            "agent" => Self::Agent,
            "system" => Self::System,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_type(&self) -> &str {
        match self {
            Self::Customer => "human",
            Self::Assistant => "ai",
            Self::Agent => "agent",
            Self::System => "system",
            Self::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ParsedMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Serialize back into the stored payload shape.
    pub fn to_payload(&self) -> String {
        serde_json::json!({
            "type": self.role.as_type(),
            "content": self.content,
        })
        .to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no text content")]
    MissingContent,
}

pub fn parse_payload(raw: &str) -> Result<ParsedMessage, ParseFailure> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;

    let object = value.as_object().ok_or(ParseFailure::NotAnObject)?;

    let content = object
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| {
            object
                .get("data")
                .and_then(|data| data.get("content"))
                .and_then(Value::as_str)
        })
        .ok_or(ParseFailure::MissingContent)?;

    let role = object
        .get("type")
        .and_then(Value::as_str)
        .map(MessageRole::from_type)
        .unwrap_or(MessageRole::Other(String::new()));

    Ok(ParsedMessage {
        role,
        content: content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_human_message() {
        let parsed = parse_payload(r#"{"type":"human","content":"Oi"}"#).unwrap();
        assert_eq!(parsed.role, MessageRole::Customer);
        assert_eq!(parsed.content, "Oi");
    }

    #[test]
    fn test_parse_nested_data_content() {
        let parsed =
            parse_payload(r#"{"type":"ai","data":{"content":"Olá! Como posso ajudar?"}}"#)
                .unwrap();
        assert_eq!(parsed.role, MessageRole::Assistant);
        assert_eq!(parsed.content, "Olá! Como posso ajudar?");
    }

    #[test]
    fn test_missing_type_is_still_parsed() {
        let parsed = parse_payload(r#"{"content":"sem tipo"}"#).unwrap();
        assert_eq!(parsed.role, MessageRole::Other(String::new()));
    }

    #[test]
    fn test_plain_text_is_a_failure() {
        assert!(matches!(
            parse_payload("not json at all"),
            Err(ParseFailure::InvalidJson(_))
        ));
    }

    #[test]
    fn test_non_object_is_a_failure() {
        assert_eq!(parse_payload("[1,2,3]"), Err(ParseFailure::NotAnObject));
        assert_eq!(parse_payload(r#""texto""#), Err(ParseFailure::NotAnObject));
    }

    #[test]
    fn test_non_string_content_is_a_failure() {
        assert_eq!(
            parse_payload(r#"{"type":"human","content":42}"#),
            Err(ParseFailure::MissingContent)
        );
    }

    #[test]
    fn test_to_payload_is_parseable() {
        let msg = ParsedMessage::new(MessageRole::Agent, "Já estamos verificando.");
        assert_eq!(parse_payload(&msg.to_payload()).unwrap(), msg);
    }
}
