use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        FunctionObjectArgs,
    },
    Client,
};
use crate::config::Config;
use crate::tools::Tool;
use std::sync::Arc;
use std::time::Duration;

pub struct LlmClient {
    chat_client: Client<OpenAIConfig>,
    chat_model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut chat_config = OpenAIConfig::new()
            .with_api_base(&config.llm_url);

        if let Some(key) = &config.llm_api_key {
            chat_config = chat_config.with_api_key(key);
        } else {
            chat_config = chat_config.with_api_key("unused");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        Ok(Self {
            chat_client: Client::with_config(chat_config).with_http_client(http_client),
            chat_model: config.llm_model.clone(),
        })
    }

    pub async fn chat_with_tools(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: &[Arc<dyn Tool>],
    ) -> anyhow::Result<CreateChatCompletionResponse> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.chat_model).messages(messages);
        if !tools.is_empty() {
            args.tools(tool_definitions(tools)?);
        }
        let request = args.build()?;

        let response = self.chat_client.chat().create(request).await?;
        Ok(response)
    }
}

/// Function definitions advertised to the model.
pub fn tool_definitions(tools: &[Arc<dyn Tool>]) -> anyhow::Result<Vec<ChatCompletionTool>> {
    tools
        .iter()
        .map(|tool| {
            let function = FunctionObjectArgs::default()
                .name(tool.name())
                .description(tool.description())
                .parameters(tool.parameters_schema())
                .build()?;
            Ok(ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(function)
                .build()?)
        })
        .collect()
}
