pub mod agent;
pub mod client;

pub use agent::Agent;
pub use client::LlmClient;

use crate::models::{Configuration, Message};
use async_trait::async_trait;

/// Produces the assistant reply for a chat.
#[async_trait]
pub trait Responder: Send + Sync {
    /// `history` is the stored conversation in creation order, ending with
    /// the customer's latest message.
    async fn respond(&self, history: &[Message], config: &Configuration) -> anyhow::Result<String>;
}
