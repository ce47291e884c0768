//! OpenAI chat completions implementation, via `async-openai`.
//!
//! Images are attached as `data:` URIs and the extraction tool is exposed as
//! a function with a named tool choice.

use std::{sync::Arc, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionName,
        FunctionObjectArgs, ImageDetail, ImageUrl,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{error, info, instrument};

use crate::base::{
    config::Config,
    tools::ToolSpec,
    types::{PageImage, Res},
};

use super::{GenericLlmClient, LlmClient, missing_tool_call};

// Extra methods on `LlmClient` applied by the openai implementation.

impl LlmClient {
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    config: Config,
}

impl OpenAiLlmClient {
    /// Create a new OpenAI LLM client.
    #[instrument(name = "OpenAiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        let mut cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        if let Some(base) = &config.openai_base_url {
            cfg = cfg.with_api_base(base.clone());
        }

        // No retries: 5xx and 429 responses fail on the first attempt.
        let backoff = ExponentialBackoffBuilder::new().with_max_elapsed_time(Some(Duration::ZERO)).build();

        Self {
            client: Client::with_config(cfg).with_backoff(backoff),
            config: config.clone(),
        }
    }

    /// Build the chat completion request.
    #[instrument(name = "OpenAiLlmClient::build_request", skip_all)]
    fn build_request(&self, images: &[PageImage], prompt: &str, tool: &ToolSpec) -> Res<CreateChatCompletionRequest> {
        build_chat_request(&self.config.openai_model, self.config.llm_max_tokens, images, prompt, tool)
    }
}

fn build_chat_request(model: &str, max_tokens: u32, images: &[PageImage], prompt: &str, tool: &ToolSpec) -> Res<CreateChatCompletionRequest> {
    let mut parts = images
        .iter()
        .map(|image| {
            ChatCompletionRequestUserMessageContentPart::ImageUrl(ChatCompletionRequestMessageContentPartImage {
                image_url: ImageUrl {
                    url: image.data_uri(),
                    detail: Some(ImageDetail::High),
                },
            })
        })
        .collect::<Vec<_>>();

    parts.push(ChatCompletionRequestUserMessageContentPart::Text(ChatCompletionRequestMessageContentPartText { text: prompt.to_string() }));

    let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
        .content(ChatCompletionRequestUserMessageContent::Array(parts))
        .build()?
        .into();

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .max_completion_tokens(max_tokens)
        .messages(vec![message])
        .tools(vec![build_tool(tool)?])
        .tool_choice(ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
            r#type: ChatCompletionToolType::Function,
            function: FunctionName { name: tool.name.to_string() },
        }))
        .build()?;

    Ok(request)
}

/// Convert a tool spec into an OpenAI function tool.
fn build_tool(tool: &ToolSpec) -> Res<ChatCompletionTool> {
    let function = FunctionObjectArgs::default()
        .name(tool.name)
        .description(tool.description)
        .parameters(tool.input_schema.clone())
        .build()?;

    Ok(ChatCompletionToolArgs::default().r#type(ChatCompletionToolType::Function).function(function).build()?)
}

/// Pull the tool arguments out of a chat completion.
#[instrument(skip_all)]
fn parse_tool_input(response: &CreateChatCompletionResponse, tool_name: &str) -> Res<Value> {
    if let Some(usage) = &response.usage {
        info!("LLM used {} input tokens, {} output tokens.", usage.prompt_tokens, usage.completion_tokens);
    }

    let call = response
        .choices
        .iter()
        .filter_map(|choice| choice.message.tool_calls.as_ref())
        .flatten()
        .find(|call| call.function.name == tool_name);

    match call {
        Some(call) => Ok(serde_json::from_str(&call.function.arguments)?),
        None => {
            error!("LLM response: {}", serde_json::to_string(&response.choices).unwrap_or_default());

            Err(missing_tool_call())
        }
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    #[instrument(name = "OpenAiLlmClient::extract", skip_all, fields(tool = tool.name))]
    async fn extract(&self, images: &[PageImage], prompt: &str, tool: &ToolSpec) -> Res<Value> {
        let request = self.build_request(images, prompt, tool)?;

        let response = timeout(Duration::from_secs(self.config.llm_timeout_secs), self.client.chat().create(request))
            .await
            .map_err(|_| anyhow::anyhow!("OpenAI API call timed out after {}s", self.config.llm_timeout_secs))?
            .map_err(|e| anyhow::anyhow!("OpenAI API call failed: {e}"))?;

        parse_tool_input(&response, tool.name)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;
    use crate::{
        base::{config::ConfigInner, tools::risk_of_bias_tool},
        service::llm::test_server::{read_request, response},
    };

    fn completion_body() -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4.1",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "extract_risk_of_bias", "arguments": "{\"bias_studies\":[]}" }
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_request_forces_tool() {
        let images = vec![PageImage { media_type: "image/png", data: "AAA".to_string() }];
        let request = build_chat_request("gpt-4.1", 4096, &images, "Extract.", risk_of_bias_tool()).unwrap();
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["tool_choice"], json!({ "type": "function", "function": { "name": "extract_risk_of_bias" } }));
        assert_eq!(value["tools"][0]["function"]["name"], "extract_risk_of_bias");
        assert_eq!(value["max_completion_tokens"], 4096);

        let content = value["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["image_url"]["url"], "data:image/png;base64,AAA");
        assert_eq!(content[1]["text"], "Extract.");
    }

    #[test]
    fn test_parse_tool_input() {
        let response: CreateChatCompletionResponse = serde_json::from_value(completion_body()).unwrap();

        let input = parse_tool_input(&response, "extract_risk_of_bias").unwrap();
        assert_eq!(input, json!({ "bias_studies": [] }));

        let err = parse_tool_input(&response, "extract_forest_plot").unwrap_err();
        assert_eq!(err.to_string(), "LLM did not return tool response");
    }

    #[tokio::test]
    async fn test_extract_does_not_retry() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        // Fail the first two requests, then answer properly.
        let counter = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;

                let reply = if attempt < 2 {
                    response("500 Internal Server Error", r#"{"error":{"message":"upstream failure","type":"server_error","param":null,"code":null}}"#)
                } else {
                    response("200 OK", &completion_body().to_string())
                };
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });

        let config = Config {
            inner: Arc::new(ConfigInner {
                openai_api_key: "sk-test".to_string(),
                openai_base_url: Some(format!("http://{address}/v1")),
                openai_model: "gpt-4.1".to_string(),
                llm_max_tokens: 4096,
                llm_timeout_secs: 10,
                ..Default::default()
            }),
        };
        let client = OpenAiLlmClient::new(&config);

        let result = client.extract(&[], "Extract.", risk_of_bias_tool()).await;

        assert!(result.is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
