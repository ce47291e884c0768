//! Anthropic Messages API implementation.
//!
//! The API is called directly over `reqwest`: images are sent as base64
//! blocks and `tool_choice` pins the model to the extraction tool.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{error, info, instrument};

use crate::base::{
    config::Config,
    tools::ToolSpec,
    types::{PageImage, Res},
};

use super::{GenericLlmClient, LlmClient, missing_tool_call};

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

// Extra methods on `LlmClient` applied by the anthropic implementation.

impl LlmClient {
    pub fn anthropic(config: &Config) -> Res<Self> {
        let client = AnthropicLlmClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    tools: Vec<ToolDefinition<'a>>,
    tool_choice: ToolChoice<'a>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolChoice<'a> {
    Tool { name: &'a str },
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

// Specific implementations.

/// Anthropic LLM client implementation.
#[derive(Clone)]
pub struct AnthropicLlmClient {
    client: reqwest::Client,
    config: Config,
}

impl AnthropicLlmClient {
    /// Create a new Anthropic LLM client.
    #[instrument(name = "AnthropicLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let client = reqwest::Client::builder().user_agent(concat!("review-parser/", env!("CARGO_PKG_VERSION"))).build()?;

        Ok(Self { client, config: config.clone() })
    }

    /// Build the messages request body.
    fn build_request<'a>(&'a self, images: &'a [PageImage], prompt: &'a str, tool: &'a ToolSpec) -> MessagesRequest<'a> {
        build_messages_request(&self.config.anthropic_model, self.config.llm_max_tokens, images, prompt, tool)
    }
}

fn build_messages_request<'a>(model: &'a str, max_tokens: u32, images: &'a [PageImage], prompt: &'a str, tool: &'a ToolSpec) -> MessagesRequest<'a> {
    let mut content = images
        .iter()
        .map(|image| ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: image.media_type,
                data: &image.data,
            },
        })
        .collect::<Vec<_>>();

    content.push(ContentBlock::Text { text: prompt });

    MessagesRequest {
        model,
        max_tokens,
        tools: vec![ToolDefinition {
            name: tool.name,
            description: tool.description,
            input_schema: &tool.input_schema,
        }],
        tool_choice: ToolChoice::Tool { name: tool.name },
        messages: vec![Message { role: "user", content }],
    }
}

/// Pull the tool input out of a raw messages response body.
///
/// When no matching tool call is present, the raw content blocks are logged.
fn parse_tool_input(body: &str, tool_name: &str) -> Res<Value> {
    let raw: Value = serde_json::from_str(body)?;
    let response: MessagesResponse = serde_json::from_value(raw.clone())?;

    if let Some(usage) = &response.usage {
        info!("LLM used {} input tokens, {} output tokens.", usage.input_tokens, usage.output_tokens);
    }

    let input = response.content.into_iter().find_map(|block| match block {
        ResponseBlock::ToolUse { name, input } if name == tool_name => Some(input),
        _ => None,
    });

    match input {
        Some(input) => Ok(input),
        None => {
            error!("LLM response (stop reason `{}`): {}", response.stop_reason.unwrap_or_default(), raw["content"]);

            Err(missing_tool_call())
        }
    }
}

/// Describe a failed call from its body, preferring the API's own error message.
fn failure_detail(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string));

    match message {
        Some(message) => message,
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => body.trim().to_string(),
    }
}

impl AnthropicLlmClient {
    /// Send one messages request and read the full response.
    async fn call_messages(&self, request: &MessagesRequest<'_>, tool_name: &str) -> Res<Value> {
        let url = format!("{}/v1/messages", self.config.anthropic_base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.config.anthropic_api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Anthropic API call failed ({status}): {}", failure_detail(status, &body)));
        }

        let body = response.text().await?;

        parse_tool_input(&body, tool_name)
    }
}

#[async_trait]
impl GenericLlmClient for AnthropicLlmClient {
    #[instrument(name = "AnthropicLlmClient::extract", skip_all, fields(tool = tool.name))]
    async fn extract(&self, images: &[PageImage], prompt: &str, tool: &ToolSpec) -> Res<Value> {
        let request = self.build_request(images, prompt, tool);

        // The limit covers the whole exchange, body included.
        timeout(Duration::from_secs(self.config.llm_timeout_secs), self.call_messages(&request, tool.name))
            .await
            .map_err(|_| anyhow::anyhow!("Anthropic API call timed out after {}s", self.config.llm_timeout_secs))?
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;
    use crate::{
        base::{config::ConfigInner, tools::forest_plot_tool},
        service::llm::test_server::{read_request, response},
    };

    fn create_test_client(base_url: &str, timeout_secs: u64) -> AnthropicLlmClient {
        let config = Config {
            inner: Arc::new(ConfigInner {
                anthropic_api_key: "sk-ant-test".to_string(),
                anthropic_base_url: base_url.to_string(),
                anthropic_model: "claude-sonnet-4-5".to_string(),
                llm_max_tokens: 4096,
                llm_timeout_secs: timeout_secs,
                ..Default::default()
            }),
        };

        AnthropicLlmClient::new(&config).unwrap()
    }

    #[test]
    fn test_request_places_images_before_prompt() {
        let images = vec![
            PageImage { media_type: "image/png", data: "AAA".to_string() },
            PageImage { media_type: "image/jpeg", data: "BBB".to_string() },
        ];
        let request = build_messages_request("claude-sonnet-4-5", 4096, &images, "Extract.", forest_plot_tool());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["tool_choice"], json!({ "type": "tool", "name": "extract_forest_plot" }));
        assert_eq!(value["tools"][0]["name"], "extract_forest_plot");
        assert_eq!(value["messages"][0]["role"], "user");

        let content = value["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0], json!({ "type": "image", "source": { "type": "base64", "media_type": "image/png", "data": "AAA" } }));
        assert_eq!(content[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[2], json!({ "type": "text", "text": "Extract." }));
    }

    #[test]
    fn test_parse_tool_input() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                { "type": "text", "text": "Here you go." },
                { "type": "tool_use", "id": "toolu_01", "name": "extract_forest_plot", "input": { "pooled_estimate": 0.8 } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 1500, "output_tokens": 300 }
        });

        let input = parse_tool_input(&body.to_string(), "extract_forest_plot").unwrap();
        assert_eq!(input, json!({ "pooled_estimate": 0.8 }));
    }

    #[test]
    fn test_parse_missing_tool_call() {
        let body = json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "I cannot read this image." }
            ],
            "stop_reason": "end_turn"
        });

        let err = parse_tool_input(&body.to_string(), "extract_forest_plot").unwrap_err();
        assert_eq!(err.to_string(), "LLM did not return tool response");
    }

    #[test]
    fn test_failure_detail() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(failure_detail(StatusCode::from_u16(529).unwrap(), body), "Overloaded");
        assert_eq!(failure_detail(StatusCode::BAD_GATEWAY, " upstream down \n"), "upstream down");
        assert_eq!(failure_detail(StatusCode::BAD_GATEWAY, ""), "HTTP 502 Bad Gateway");
    }

    #[tokio::test]
    async fn test_extract_times_out_on_stalled_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        // Answer with headers and a partial body, then hang.
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 1000\r\n\r\n{\"content\":";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();

            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = create_test_client(&format!("http://{address}"), 1);
        let started = Instant::now();

        let result = tokio::time::timeout(Duration::from_secs(5), client.extract(&[], "Extract.", forest_plot_tool()))
            .await
            .expect("extract should be bounded by llm_timeout_secs");

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Anthropic API call timed out after 1s");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_extract_reports_api_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            assert!(request.contains("x-api-key: sk-ant-test"));

            let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad image"}}"#;
            socket.write_all(response("400 Bad Request", body).as_bytes()).await.unwrap();
        });

        let client = create_test_client(&format!("http://{address}"), 5);
        let err = client.extract(&[], "Extract.", forest_plot_tool()).await.unwrap_err();

        assert_eq!(err.to_string(), "Anthropic API call failed (400 Bad Request): bad image");
    }
}
