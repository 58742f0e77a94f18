//! Persisted document shapes.
//!
//! Field names are part of the stored format and must not change.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form key/value metadata attached to chats and messages.
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Storage key of a message: chat id and message id joined by `:`.
    pub fn storage_key(chat_id: &str, message_id: i64) -> String {
        format!("{}:{}", chat_id, message_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub name: String,
    pub description: String,
}

/// The configuration singleton: knowledge base plus available actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub knowledge_base: Vec<KnowledgeItem>,
    #[serde(default)]
    pub actions: Vec<ActionItem>,
}

impl Configuration {
    pub fn is_empty(&self) -> bool {
        self.knowledge_base.is_empty() && self.actions.is_empty()
    }
}

/// RFC 3339, UTC, millisecond precision. Fixed width, so lexical order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_from_millis(millis: i64) -> String {
    let ts = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
    format_timestamp(ts)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = timestamp_from_millis(1_700_000_000_000);
        let b = timestamp_from_millis(1_700_000_000_123);
        assert_eq!(a, "2023-11-14T22:13:20.000Z");
        assert_eq!(b, "2023-11-14T22:13:20.123Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn test_knowledge_item_omits_absent_optionals() {
        let item = KnowledgeItem {
            id: "kb-001".to_string(),
            title: "Reset".to_string(),
            content: "Tap it".to_string(),
            category: "troubleshooting".to_string(),
            relevance_score: None,
            tags: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "kb-001",
                "title": "Reset",
                "content": "Tap it",
                "category": "troubleshooting"
            })
        );
    }

    #[test]
    fn test_configuration_ignores_updated_at() {
        let doc = json!({
            "knowledge_base": [],
            "actions": [{"name": "refund", "description": "Issue a refund"}],
            "updated_at": "x"
        });
        let config: Configuration = serde_json::from_value(doc).unwrap();
        assert!(config.knowledge_base.is_empty());
        assert_eq!(config.actions.len(), 1);
        assert!(!config.is_empty());
    }

    #[test]
    fn test_message_storage_key() {
        assert_eq!(Message::storage_key("abc", 42), "abc:42");
    }
}
