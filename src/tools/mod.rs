use std::collections::HashMap;
use std::sync::Arc;
use serde_json::Value;
use async_trait::async_trait;

pub mod builtin;
pub mod executor;

pub use executor::ToolExecutor;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> anyhow::Result<Value>;
}

/// Tool name to executor mapping, owned by one application instance.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the built-in support tools bound to `store`.
    pub fn with_builtins(store: Arc<crate::db::ChatStore>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::knowledge::SearchKnowledgeBaseTool {
            store: store.clone(),
        }));
        registry.register(Arc::new(builtin::knowledge::ListActionsTool { store }));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools sorted by name.
    pub fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }
}


#[cfg(test)]
mod tests {
    use super::testing::EchoTool;
    use super::*;
    use crate::db::{ChatStore, StoreOptions};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(EchoTool));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("Echo").is_none());
    }

    #[test]
    fn test_builtins_are_isolated_per_registry() {
        let store = Arc::new(ChatStore::sqlite(StoreOptions::in_memory("support")));
        let mut first = ToolRegistry::with_builtins(store.clone());
        let second = ToolRegistry::with_builtins(store);
        first.register(Arc::new(EchoTool));

        let names: Vec<_> = second.list_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["list_actions", "search_knowledge_base"]);
        assert_eq!(first.len(), 3);
    }
}
