pub mod config;
pub mod db;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod server;
pub mod startup;
pub mod tools;

use std::sync::Arc;

/// Shared application context handed to every request handler.
pub struct Data {
    pub config: config::Config,
    pub store: Arc<db::ChatStore>,
    pub tools: Arc<tools::ToolRegistry>,
    pub responder: Arc<dyn llm::Responder>,
}

impl Data {
    /// Production wiring: SQLite-backed store, built-in tools and the LLM agent.
    pub fn new(config: config::Config) -> anyhow::Result<Self> {
        let store = Arc::new(db::ChatStore::sqlite(db::StoreOptions::from_config(&config)));
        let tools = Arc::new(tools::ToolRegistry::with_builtins(store.clone()));
        let agent = llm::Agent::new(
            llm::LlmClient::new(&config)?,
            tools::ToolExecutor::new(tools.clone()),
            config.system_prompt.clone(),
            config.agent_max_iterations,
        );

        Ok(Self {
            config,
            store,
            tools,
            responder: Arc::new(agent),
        })
    }
}
