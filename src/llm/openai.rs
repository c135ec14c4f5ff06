use super::*;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use futures::StreamExt;

/// OpenAI (or OpenAI-compatible) chat completion provider
pub struct OpenAiProvider {
    name: String,
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given API key and model
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            name: "openai".to_string(),
            client: Client::with_config(config),
            model,
        }
    }

    /// Provider for any OpenAI-compatible endpoint (e.g. NVIDIA NIM)
    pub fn with_base_url(name: &str, api_key: String, base_url: String, model: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Self {
            name: name.to_string(),
            client: Client::with_config(config),
            model,
        }
    }

    /// Streaming chat request and the model it targets
    fn build_request(
        &self,
        request: &GenerateRequest,
    ) -> LlmResult<(String, CreateChatCompletionRequest)> {
        // Use model override if provided, otherwise use configured model
        let model = request
            .model_override
            .clone()
            .unwrap_or_else(|| self.model.clone());

        let messages = request
            .messages
            .iter()
            .map(to_request_message)
            .collect::<LlmResult<Vec<_>>>()?;

        let mut req_builder = CreateChatCompletionRequestArgs::default();
        req_builder.model(&model).messages(messages).stream(true);

        if let Some(max_tokens) = request.max_tokens {
            req_builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            req_builder.temperature(temperature);
        }
        if let Some(top_p) = request.top_p {
            req_builder.top_p(top_p);
        }

        let chat_request = req_builder
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;
        Ok((model, chat_request))
    }
}

fn to_request_message(turn: &ChatTurn) -> LlmResult<ChatCompletionRequestMessage> {
    let content = turn.content.clone();
    let message = match turn.role {
        TurnRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?
            .into(),
        TurnRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?
            .into(),
        TurnRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn stream(&self, request: GenerateRequest) -> LlmResult<FragmentStream> {
        let (model, chat_request) = self.build_request(&request)?;
        tracing::debug!("Opening {} stream for model {}", self.name, model);

        let stream =
            tokio::time::timeout(request.timeout, self.client.chat().create_stream(chat_request))
                .await
                .map_err(|_| LlmError::Timeout(request.timeout))?
                .map_err(|e| LlmError::ApiError(e.to_string()))?;

        // Keep only non-empty content deltas
        let fragments = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .find_map(|choice| choice.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(LlmError::ApiError(e.to_string()))),
            }
        });

        Ok(Box::pin(fragments))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
