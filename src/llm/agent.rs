use crate::knowledge::{self, SearchFilter};
use crate::llm::client::LlmClient;
use crate::llm::Responder;
use crate::models::{Configuration, Message};
use crate::tools::ToolExecutor;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct Agent {
    llm: LlmClient,
    executor: ToolExecutor,
    system_prompt: String,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        llm: LlmClient,
        executor: ToolExecutor,
        system_prompt: String,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            executor,
            system_prompt,
            max_iterations,
        }
    }

    pub async fn run(
        &self,
        mut messages: Vec<ChatCompletionRequestMessage>,
    ) -> anyhow::Result<String> {
        let tools = self.executor.registry().list_tools();

        for i in 0..self.max_iterations {
            tracing::info!("Agent iteration {}/{}", i + 1, self.max_iterations);

            let response = self.llm.chat_with_tools(messages.clone(), &tools).await?;
            let choice = response
                .choices
                .first()
                .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?;
            let assistant_message = &choice.message;

            match assistant_message.tool_calls.as_ref().filter(|calls| !calls.is_empty()) {
                Some(tool_calls) => {
                    messages.push(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .tool_calls(tool_calls.clone())
                            .build()?
                            .into(),
                    );

                    tracing::info!("LLM requested {} tool calls", tool_calls.len());
                    for tool_call in tool_calls {
                        let result = self.execute_tool_call(tool_call).await;
                        messages.push(
                            ChatCompletionRequestToolMessageArgs::default()
                                .tool_call_id(tool_call.id.clone())
                                .content(result.to_string())
                                .build()?
                                .into(),
                        );
                    }
                }
                None => {
                    tracing::info!("Agent task completed after {} iterations", i + 1);
                    return Ok(assistant_message.content.clone().unwrap_or_default());
                }
            }
        }

        tracing::warn!("Agent exceeded max iterations ({})", self.max_iterations);
        Err(anyhow::anyhow!(
            "Assistant did not finish within {} steps",
            self.max_iterations
        ))
    }

    /// Tool failures are reported back to the model rather than aborting the turn.
    async fn execute_tool_call(&self, tool_call: &ChatCompletionMessageToolCall) -> Value {
        let name = &tool_call.function.name;
        let arguments: Value = match serde_json::from_str(&tool_call.function.arguments) {
            Ok(v) => v,
            Err(e) => return json!({ "error": format!("Invalid arguments: {}", e) }),
        };

        match self.executor.execute(name, arguments).await {
            Ok(v) => v,
            Err(e) => json!({ "error": e.to_string() }),
        }
    }
}

#[async_trait]
impl Responder for Agent {
    async fn respond(&self, history: &[Message], config: &Configuration) -> anyhow::Result<String> {
        let messages = build_prompt(&self.system_prompt, history, config)?;
        self.run(messages).await
    }
}

/// System prompt extended with the configured actions and knowledge hits for `query`.
pub fn system_content(system_prompt: &str, config: &Configuration, query: Option<&str>) -> String {
    let mut content = system_prompt.to_string();

    if !config.actions.is_empty() {
        content.push_str("\n\nAvailable actions:\n");
        let actions: Vec<String> = config
            .actions
            .iter()
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect();
        content.push_str(&actions.join("\n"));
    }

    if let Some(query) = query {
        let hits = knowledge::search(&config.knowledge_base, query, &SearchFilter::default());
        if !hits.is_empty() {
            content.push_str("\n\nRelevant knowledge base articles:\n");
            content.push_str(&knowledge::format_context(&hits));
        }
    }

    content
}

pub fn build_prompt(
    system_prompt: &str,
    history: &[Message],
    config: &Configuration,
) -> anyhow::Result<Vec<ChatCompletionRequestMessage>> {
    let last_user = history
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str());

    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_content(system_prompt, config, last_user))
            .build()?
            .into(),
    );

    for message in history {
        let request: ChatCompletionRequestMessage = match message.role.as_str() {
            "system" => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
            "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
        };
        messages.push(request);
    }

    Ok(messages)
}
