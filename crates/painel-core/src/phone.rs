/// Utilities for pulling phone numbers out of session identifiers
use std::sync::LazyLock;

use regex::Regex;

static PHONE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$").unwrap());
static PHONE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{10,15}").unwrap());

/// Extract the phone key used to group messages into a conversation
/// - If the first `-` separated segment is a 10-15 digit number, use it
/// - Otherwise, use the first run of 10-15 digits anywhere in the string
/// - If there is none, the session id itself is the key
pub fn extract_phone(session_id: &str) -> String {
    if let Some(first) = session_id.split('-').next() {
        if PHONE_SEGMENT.is_match(first) {
            return first.to_string();
        }
    }

    match PHONE_RUN.find(session_id) {
        Some(m) => m.as_str().to_string(),
        None => session_id.to_string(),
    }
}

/// Whether the phone key is an actual number rather than a raw session id
pub fn is_phone_number(phone_key: &str) -> bool {
    PHONE_SEGMENT.is_match(phone_key)
}

/// Format a phone number string for better readability
/// Example: "5511999999999" -> "+55 11 99999-9999"
pub fn format_phone_number(phone: &str) -> String {
    if !is_phone_number(phone) {
        return phone.to_string();
    }

    if phone.starts_with("55") && phone.len() >= 12 {
        let (country, area, rest) = (&phone[0..2], &phone[2..4], &phone[4..]);

        if rest.len() == 9 {
            // Mobile
            return format!("+{} {} {}-{}", country, area, &rest[0..5], &rest[5..]);
        } else if rest.len() == 8 {
            // Landline
            return format!("+{} {} {}-{}", country, area, &rest[0..4], &rest[4..]);
        }
    }

    if phone.len() > 10 {
        return format!("+{}", phone);
    }

    phone.to_string()
}
