//! Portable conversation document used for export and import.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::core::conversation::Conversation;
use crate::store::core::errors::{ChatError, ChatResult};
use crate::store::core::ids::MessageId;
use crate::store::core::message::Message;

/// Self-describing snapshot of one conversation, suitable for file download.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDocument {
    /// Id of the conversation at export time. Ignored on import.
    #[serde(default)]
    pub conversation_id: String,
    /// Display name.
    pub name: String,
    /// Last write timestamp at export time, in epoch milliseconds.
    #[serde(default)]
    pub last_modified: i64,
    /// Ordered messages with their opaque metadata.
    pub messages: Vec<Message>,
}

impl ConversationDocument {
    /// Snapshot a conversation.
    #[must_use]
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            conversation_id: conversation.id.to_string(),
            name: conversation.name.clone(),
            last_modified: conversation.last_modified,
            messages: conversation.messages.clone(),
        }
    }

    /// Validate the shape of an untrusted JSON document.
    ///
    /// Message entries without an `id` get a fresh one; numeric ids are
    /// accepted and kept in their decimal form.
    ///
    /// # Errors
    /// Returns `InvalidFormat` on any structural mismatch.
    pub fn from_value(value: &Value) -> ChatResult<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| invalid("document must be a JSON object"))?;

        let name = match root.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(invalid("`name` must be a string")),
            None => return Err(invalid("missing `name`")),
        };

        let entries = match root.get("messages") {
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(invalid("`messages` must be an array")),
            None => return Err(invalid("missing `messages`")),
        };

        let conversation_id = match root.get("conversationId") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        let last_modified = root
            .get("lastModified")
            .and_then(Value::as_i64)
            .unwrap_or_default();

        let mut seen = HashSet::with_capacity(entries.len());
        let mut messages = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let message = parse_message(index, entry)?;
            if !seen.insert(message.id.clone()) {
                return Err(invalid(&format!(
                    "messages[{index}] repeats id {}",
                    message.id
                )));
            }
            messages.push(message);
        }

        Ok(Self {
            conversation_id,
            name,
            last_modified,
            messages,
        })
    }

    /// Suggested download file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("conversation_{}.json", self.conversation_id)
    }

    /// Two-space indented JSON, as written to disk.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> ChatResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse untrusted document text into JSON, before shape validation.
///
/// # Errors
/// Returns `InvalidFormat` if the text is not JSON.
pub fn parse_json(raw: &str) -> ChatResult<Value> {
    serde_json::from_str(raw).map_err(|err| invalid(&format!("not valid JSON: {err}")))
}

fn parse_message(index: usize, entry: &Value) -> ChatResult<Message> {
    let fields = entry
        .as_object()
        .ok_or_else(|| invalid(&format!("messages[{index}] must be an object")))?;

    let id = match fields.get("id") {
        None | Some(Value::Null) => MessageId::generate(),
        Some(Value::String(raw)) => MessageId::new(raw)
            .map_err(|err| invalid(&format!("messages[{index}].id: {err}")))?,
        Some(Value::Number(raw)) => MessageId::new(raw.to_string())
            .map_err(|err| invalid(&format!("messages[{index}].id: {err}")))?,
        Some(_) => {
            return Err(invalid(&format!(
                "messages[{index}].id must be a string"
            )));
        }
    };
    let role = string_field(index, fields, "role")?;
    let content = string_field(index, fields, "content")?;

    let extra: Map<String, Value> = fields
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "role" | "content"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Message {
        id,
        role,
        content,
        extra,
    })
}

fn string_field(index: usize, fields: &Map<String, Value>, key: &str) -> ChatResult<String> {
    match fields.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(invalid(&format!("messages[{index}].{key} must be a string"))),
        None => Err(invalid(&format!("messages[{index}] is missing `{key}`"))),
    }
}

fn invalid(reason: &str) -> ChatError {
    ChatError::InvalidFormat(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::core::ids::ConversationId;

    #[test]
    fn test_export_shape_is_camel_case() {
        let conversation = Conversation {
            id: ConversationId::new(),
            name: "Trip".to_string(),
            last_modified: 1_700_000_000_000,
            messages: vec![Message::user("hello").with_extra("timestamp", json!(5))],
        };
        let doc = ConversationDocument::from_conversation(&conversation);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["conversationId"], conversation.id.to_string());
        assert_eq!(value["lastModified"], 1_700_000_000_000_i64);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["timestamp"], 5);
        assert_eq!(
            doc.file_name(),
            format!("conversation_{}.json", conversation.id)
        );
    }

    #[test]
    fn test_rejects_missing_messages() {
        let err = ConversationDocument::from_value(&json!({ "name": "x" })).unwrap_err();
        assert!(matches!(err, ChatError::InvalidFormat(ref m) if m.contains("messages")));
    }

    #[test]
    fn test_rejects_missing_name_and_non_array_messages() {
        assert!(ConversationDocument::from_value(&json!({ "messages": [] })).is_err());
        assert!(
            ConversationDocument::from_value(&json!({ "name": "x", "messages": {} })).is_err()
        );
        assert!(ConversationDocument::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_rejects_bad_message_entries() {
        let missing_role = json!({ "name": "x", "messages": [{ "id": "1", "content": "c" }] });
        assert!(ConversationDocument::from_value(&missing_role).is_err());

        let duplicate = json!({
            "name": "x",
            "messages": [
                { "id": "1", "role": "user", "content": "a" },
                { "id": "1", "role": "assistant", "content": "b" }
            ]
        });
        let err = ConversationDocument::from_value(&duplicate).unwrap_err();
        assert!(err.to_string().contains("repeats id"));
    }

    #[test]
    fn test_message_ids_are_kept_verbatim() {
        let doc = ConversationDocument::from_value(&json!({
            "name": "x",
            "messages": [
                { "id": " 1", "role": "user", "content": "a" },
                { "id": "1", "role": "assistant", "content": "b" }
            ]
        }))
        .unwrap();

        assert_eq!(doc.messages[0].id.as_str(), " 1");
        assert_eq!(doc.messages[1].id.as_str(), "1");
        assert!(ConversationDocument::from_value(&json!({
            "name": "x",
            "messages": [{ "id": "  ", "role": "user", "content": "a" }]
        }))
        .is_err());
    }

    #[test]
    fn test_accepts_numeric_and_missing_ids() {
        let doc = ConversationDocument::from_value(&json!({
            "conversationId": "conv-1",
            "name": "Imported",
            "messages": [
                { "id": 1_712_000_000_000_i64, "role": "user", "content": "a", "convId": "conv-1" },
                { "role": "assistant", "content": "b" }
            ]
        }))
        .unwrap();

        assert_eq!(doc.messages[0].id.as_str(), "1712000000000");
        assert_eq!(doc.messages[0].extra["convId"], "conv-1");
        assert!(!doc.messages[1].id.as_str().is_empty());
        assert_eq!(doc.last_modified, 0);
    }

    #[test]
    fn test_invalid_json_text() {
        let err = parse_json("{ nope").unwrap_err();
        assert!(matches!(err, ChatError::InvalidFormat(_)));
        assert_eq!(parse_json("[]").unwrap(), json!([]));
    }
}
