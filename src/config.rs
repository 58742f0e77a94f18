use crate::db::BackoffPolicy;
use crate::models::Configuration;
use dotenvy::dotenv;
use std::env;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub http_bind: String,
    // Document store
    pub database_url: String,
    pub store_bucket: String,
    pub store_scope: String,
    pub chats_collection: String,
    pub messages_collection: String,
    pub configuration_collection: String,
    pub gate_policy: BackoffPolicy,
    // Startup connection loop
    pub startup_connect_attempts: u32,
    pub startup_gate_policy: BackoffPolicy,
    // LLM
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub agent_max_iterations: usize,
    pub system_prompt: String,
    pub greeting_message: String,
    /// Configuration written at startup when the store holds none.
    pub knowledge_seed: Option<Configuration>,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a customer support assistant. \
Answer the customer's question using the knowledge base information provided to you. \
When the knowledge base does not cover the question, say so \
and offer the available actions instead. \
Be concise and empathetic.";

const DEFAULT_GREETING: &str =
    "I'm a helpful customer support assistant. How can I help you today?";

const KNOWLEDGE_SEED_FILE: &str = "knowledge_base.toml";

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| humantime::parse_duration(v.trim()).ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let store_bucket = env::var("STORE_BUCKET").unwrap_or_else(|_| "support".to_string());
        if store_bucket.trim().is_empty() {
            anyhow::bail!("STORE_BUCKET must not be empty");
        }
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "data/supportdesk.db".to_string());
        if database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }

        Ok(Config {
            http_bind: env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            database_url,
            store_bucket,
            store_scope: env::var("STORE_SCOPE").unwrap_or_else(|_| "_default".to_string()),
            chats_collection: env::var("STORE_CHATS_COLLECTION")
                .unwrap_or_else(|_| "chats".to_string()),
            messages_collection: env::var("STORE_MESSAGES_COLLECTION")
                .unwrap_or_else(|_| "chat_messages".to_string()),
            configuration_collection: env::var("STORE_CONFIGURATION_COLLECTION")
                .unwrap_or_else(|_| "configuration".to_string()),
            gate_policy: BackoffPolicy::new(
                env_or("STORE_GATE_MAX_RETRIES", 30),
                env_duration("STORE_GATE_INITIAL_DELAY", Duration::from_secs(1)),
                env_duration("STORE_GATE_MAX_DELAY", Duration::from_secs(10)),
            ),
            startup_connect_attempts: env_or("STARTUP_CONNECT_ATTEMPTS", 5),
            startup_gate_policy: BackoffPolicy::new(
                env_or("STARTUP_GATE_MAX_RETRIES", 10),
                env_duration("STARTUP_GATE_INITIAL_DELAY", Duration::from_secs(2)),
                env_duration("STARTUP_GATE_MAX_DELAY", Duration::from_secs(10)),
            ),
            llm_url: env::var("LLM_URL").unwrap_or_else(|_| "http://localhost:8080/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_timeout_secs: env_or("LLM_TIMEOUT_SECS", 120),
            agent_max_iterations: env_or("AGENT_MAX_ITERATIONS", 5),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            greeting_message: env::var("GREETING_MESSAGE")
                .unwrap_or_else(|_| DEFAULT_GREETING.to_string()),
            knowledge_seed: Self::load_knowledge_seed(KNOWLEDGE_SEED_FILE)?,
        })
    }

    /// Reads the seed configuration from a TOML file, falling back to the
    /// `KNOWLEDGE_BASE` env var as JSON. No seed at all is fine.
    pub fn load_knowledge_seed(path: &str) -> anyhow::Result<Option<Configuration>> {
        if let Ok(content) = fs::read_to_string(path) {
            let seed: Configuration = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid knowledge base file {}: {}", path, e))?;
            return Ok(Some(seed));
        }

        if let Ok(raw) = env::var("KNOWLEDGE_BASE") {
            let seed: Configuration = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("KNOWLEDGE_BASE is not valid JSON: {}", e))?;
            return Ok(Some(seed));
        }

        Ok(None)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_bind", &self.http_bind)
            .field("database_url", &self.database_url)
            .field("store_bucket", &self.store_bucket)
            .field("store_scope", &self.store_scope)
            .field("chats_collection", &self.chats_collection)
            .field("messages_collection", &self.messages_collection)
            .field("configuration_collection", &self.configuration_collection)
            .field("gate_policy", &self.gate_policy)
            .field("startup_connect_attempts", &self.startup_connect_attempts)
            .field("startup_gate_policy", &self.startup_gate_policy)
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("agent_max_iterations", &self.agent_max_iterations)
            .field("system_prompt", &self.system_prompt)
            .field("greeting_message", &self.greeting_message)
            .field(
                "knowledge_seed",
                &self.knowledge_seed.as_ref().map(|s| s.knowledge_base.len()),
            )
            .finish()
    }
}
