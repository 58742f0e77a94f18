use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use super::error::Result;
use super::ChatStore;
use crate::models::{now_timestamp, ActionItem, Configuration, KnowledgeItem};

/// Key of the configuration singleton.
pub const CONFIGURATION_KEY: &str = "config";

#[derive(Serialize)]
struct ConfigurationDocument<'a> {
    knowledge_base: &'a [KnowledgeItem],
    actions: &'a [ActionItem],
    updated_at: String,
}

impl ChatStore {
    /// Current configuration; an absent document is an empty configuration.
    pub fn get_configuration(&self) -> Result<Configuration> {
        let bound = self.bound()?;
        let doc = bound
            .backend
            .get(&bound.collections.configuration, CONFIGURATION_KEY)
            .map_err(|e| {
                error!("Failed to get configuration: {}", e);
                e
            })?;
        match doc {
            None | Some(Value::Null) => {
                debug!("No stored configuration, returning empty");
                Ok(Configuration::default())
            }
            Some(Value::Object(ref map)) if map.is_empty() => Ok(Configuration::default()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    /// Overwrites the configuration singleton. Last write wins.
    pub fn set_configuration(&self, config: &Configuration) -> Result<()> {
        let bound = self.bound()?;
        let doc = ConfigurationDocument {
            knowledge_base: &config.knowledge_base,
            actions: &config.actions,
            updated_at: now_timestamp(),
        };
        bound
            .backend
            .upsert(
                &bound.collections.configuration,
                CONFIGURATION_KEY,
                &serde_json::to_value(&doc)?,
            )
            .map_err(|e| {
                error!("Failed to save configuration: {}", e);
                e
            })?;
        info!(
            "Saved configuration ({} knowledge items, {} actions)",
            config.knowledge_base.len(),
            config.actions.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreOptions;
    use serde_json::json;

    fn store() -> ChatStore {
        ChatStore::sqlite(StoreOptions::in_memory("support"))
    }

    fn sample() -> Configuration {
        Configuration {
            knowledge_base: vec![
                KnowledgeItem {
                    id: "kb-001".to_string(),
                    title: "How do I reset my device?".to_string(),
                    content: "Tap the Primary Cognition Node.".to_string(),
                    category: "troubleshooting".to_string(),
                    relevance_score: None,
                    tags: Some(vec!["reset".to_string()]),
                },
                KnowledgeItem {
                    id: "kb-003".to_string(),
                    title: "What is your return policy?".to_string(),
                    content: "Returns within 30 planetary alignments.".to_string(),
                    category: "policy".to_string(),
                    relevance_score: None,
                    tags: None,
                },
            ],
            actions: vec![ActionItem {
                name: "escalate".to_string(),
                description: "Hand the chat to a human agent".to_string(),
            }],
        }
    }

    #[test]
    fn test_empty_store_has_empty_configuration() {
        let store = store();
        let config = store.get_configuration().unwrap();
        assert!(config.knowledge_base.is_empty());
        assert!(config.actions.is_empty());
    }

    #[test]
    fn test_configuration_round_trip() {
        let store = store();
        let config = sample();
        store.set_configuration(&config).unwrap();
        assert_eq!(store.get_configuration().unwrap(), config);
    }

    #[test]
    fn test_set_configuration_overwrites_wholesale() {
        let store = store();
        store.set_configuration(&sample()).unwrap();

        let replacement = Configuration {
            knowledge_base: Vec::new(),
            actions: vec![ActionItem {
                name: "refund".to_string(),
                description: "Issue a refund".to_string(),
            }],
        };
        store.set_configuration(&replacement).unwrap();
        assert_eq!(store.get_configuration().unwrap(), replacement);
    }

    #[test]
    fn test_stored_document_shape() {
        let store = store();
        store.set_configuration(&sample()).unwrap();

        let bound = store.bound().unwrap();
        let doc = bound
            .backend
            .get(&bound.collections.configuration, CONFIGURATION_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(
            doc["knowledge_base"][1],
            json!({
                "id": "kb-003",
                "title": "What is your return policy?",
                "content": "Returns within 30 planetary alignments.",
                "category": "policy"
            })
        );
        assert_eq!(doc["actions"][0]["name"], "escalate");
        assert!(doc["updated_at"].as_str().unwrap().ends_with('Z'));
    }
}
