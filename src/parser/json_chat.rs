//! JSON 对话导出解析
//!
//! 期望格式：
//! ```json
//! {
//!   "id": "...",
//!   "title": "...",
//!   "created": 1672531200000,
//!   "updated": 1672531200000,
//!   "messages": [
//!     { "role": "user|assistant|...", "content": "..." }
//!   ]
//! }
//! ```
//! `created` / `updated` 为毫秒时间戳；`updated` 换算成秒后作为上传请求的
//! `timestamp`，保留原始对话的时间。

use super::role::normalize_role;
use super::{ParsedContent, insert_str, now_iso};
use crate::api::types::{Message, Metadata, Role};
use crate::error::{FormatError, Result};
use chrono::DateTime;
use serde_json::Value;

pub fn parse_json_chat(raw: &str) -> Result<ParsedContent> {
    let data: Value =
        serde_json::from_str(raw).map_err(|e| FormatError::InvalidJson(e.to_string()))?;

    let entries = data
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(FormatError::MissingMessages)?;

    let messages: Vec<Message> = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|msg| {
            let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = msg.get("content").and_then(Value::as_str)?;
            Message::new(normalize_role(role), content)
        })
        .collect();

    if messages.is_empty() {
        return Err(FormatError::NoValidMessages.into());
    }

    let mut metadata = Metadata::new();
    insert_str(&mut metadata, "source", "json_chat");
    insert_str(&mut metadata, "format", "json_conversation");
    insert_str(&mut metadata, "parsed_at", &now_iso());

    if let Some(title) = data.get("title").and_then(scalar_to_string) {
        insert_str(&mut metadata, "conversation_title", &title);
    }
    if let Some(id) = data.get("id").and_then(scalar_to_string) {
        insert_str(&mut metadata, "conversation_id", &id);
    }
    if let Some(created) = data.get("created") {
        if let Some(text) = millis_to_iso(created).or_else(|| scalar_to_string(created)) {
            insert_str(&mut metadata, "conversation_created", &text);
        }
    }

    let updated = data.get("updated");
    if let Some(text) = updated.and_then(|v| millis_to_iso(v).or_else(|| scalar_to_string(v))) {
        insert_str(&mut metadata, "conversation_updated", &text);
    }
    let timestamp = updated.and_then(millis_to_secs);

    let user_count = messages.iter().filter(|m| m.role == Role::User).count();
    metadata.insert("message_count".into(), messages.len().into());
    metadata.insert("user_message_count".into(), user_count.into());
    metadata.insert(
        "assistant_message_count".into(),
        (messages.len() - user_count).into(),
    );

    Ok(ParsedContent {
        messages,
        metadata,
        timestamp,
    })
}

/// 毫秒时间戳 → 整秒（向下取整）
fn millis_to_secs(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return Some(ms.div_euclid(1000));
    }
    value
        .as_f64()
        .filter(|ms| ms.is_finite())
        .map(|ms| (ms / 1000.0).floor() as i64)
}

fn millis_to_iso(value: &Value) -> Option<String> {
    let ms = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
    DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn test_updated_millis_become_timestamp_seconds() {
        let raw = r#"{
            "id": "conv-1",
            "title": "周报讨论",
            "updated": 1672531200000,
            "messages": [
                {"role": "user", "content": "帮我整理本周进展"},
                {"role": "assistant", "content": "好的，以下是要点"}
            ]
        }"#;
        let parsed = parse_json_chat(raw).unwrap();
        assert_eq!(parsed.timestamp, Some(1672531200));
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(parsed.metadata["conversation_title"], "周报讨论");
        assert_eq!(parsed.metadata["conversation_updated"], "2023-01-01T00:00:00+00:00");
        assert_eq!(parsed.metadata["assistant_message_count"], 1);
    }

    #[test]
    fn test_blank_and_invalid_entries_are_dropped() {
        let raw = r#"{"messages": [
            {"role": "user", "content": "   "},
            "not an object",
            {"role": "system", "content": "be nice"},
            {"role": "bot", "content": 42},
            {"content": "  hello  "}
        ]}"#;
        let parsed = parse_json_chat(raw).unwrap();
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[1].content, "hello");
        assert!(parsed.timestamp.is_none());
        assert!(parsed.messages.iter().all(|m| !m.content.trim().is_empty()));
    }

    #[test]
    fn test_missing_messages_array() {
        let err = parse_json_chat(r#"{"title": "x"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::MissingMessages)));

        let err = parse_json_chat(r#"{"messages": "oops"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::MissingMessages)));
    }

    #[test]
    fn test_no_valid_messages_and_bad_json() {
        let err = parse_json_chat(r#"{"messages": [{"role": "user", "content": ""}]}"#).unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::NoValidMessages)));

        let err = parse_json_chat("{ not json").unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::InvalidJson(_))));
    }
}
