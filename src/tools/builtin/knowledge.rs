use crate::db::ChatStore;
use crate::knowledge::{self, SearchFilter};
use crate::tools::Tool;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KnowledgeSearchParams {
    /// Keywords describing the customer's problem
    pub query: String,
    /// Restrict results to one knowledge base category
    #[serde(default)]
    pub category: Option<String>,
}

fn schema_value<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

pub struct SearchKnowledgeBaseTool {
    pub store: Arc<ChatStore>,
}

#[async_trait]
impl Tool for SearchKnowledgeBaseTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the support knowledge base for articles matching the customer's question."
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<KnowledgeSearchParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: KnowledgeSearchParams = serde_json::from_value(params)
            .map_err(|e| anyhow::anyhow!("Invalid search parameters: {}", e))?;
        if params.query.trim().is_empty() {
            return Err(anyhow::anyhow!("Missing query"));
        }

        let config = self.store.run_blocking(|s| s.get_configuration()).await?;
        let mut filter = SearchFilter::default();
        if let Some(category) = params.category.filter(|c| !c.is_empty()) {
            filter = filter.with_category(category);
        }
        let results = knowledge::search(&config.knowledge_base, &params.query, &filter);

        Ok(json!({
            "count": results.len(),
            "results": results,
        }))
    }
}

pub struct ListActionsTool {
    pub store: Arc<ChatStore>,
}

#[async_trait]
impl Tool for ListActionsTool {
    fn name(&self) -> &str {
        "list_actions"
    }

    fn description(&self) -> &str {
        "List the support actions that can be offered to the customer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<Value> {
        let config = self.store.run_blocking(|s| s.get_configuration()).await?;
        Ok(json!({ "actions": config.actions }))
    }
}
