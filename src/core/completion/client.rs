//! HTTP client for the Completion Service.
//!
//! Speaks the chat-completions convention: `POST {base}/chat/completions`
//! with bearer auth; a plain JSON reply for single-shot use, or an SSE-style
//! `data: <json>` body when streaming. Tool calls arrive fragmented across
//! stream deltas and are reassembled here before being surfaced.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::{ChatTurn, CompletionError};
use crate::core::recipe::{SET_RECIPE_TOOL, set_recipe_schema};

/// One decoded item of a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    /// Incremental reply text
    Content(String),
    /// A fully reassembled tool call
    ToolCall { name: String, arguments: String },
    /// Stream finished normally; always the last event
    Done,
}

/// Client for the chat-completion API.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        request
    }

    /// Single-shot completion: send the message list, return the full reply.
    pub async fn complete(&self, messages: &[ChatTurn]) -> Result<String, CompletionError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
        });

        let response = self.request(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::MissingContent)
    }

    /// Streaming completion: reply tokens and tool calls as they arrive.
    ///
    /// When `with_recipe_tool` is set the request advertises the `set_recipe`
    /// tool so the model can signal a recipe mutation. Dropping the returned
    /// stream aborts the underlying request, which is how client-initiated
    /// cancellation propagates to the service.
    pub async fn stream(
        &self,
        messages: Vec<ChatTurn>,
        with_recipe_tool: bool,
    ) -> Result<BoxStream<'static, Result<CompletionEvent, CompletionError>>, CompletionError>
    {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if with_recipe_tool {
            body["tools"] = json!([{
                "type": "function",
                "function": {
                    "name": SET_RECIPE_TOOL,
                    "description": "Replace the recipe the user is looking at with an updated version",
                    "parameters": set_recipe_schema(),
                },
            }]);
        }

        let response = self.request(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let bytes = response.bytes_stream();
        Ok(decode_stream(bytes).boxed())
    }
}

/// Decode an SSE-style byte stream into [`CompletionEvent`]s.
///
/// Lines may be split across network deliveries, so undecoded bytes are
/// buffered until a full line arrives. Unparseable payload lines are logged
/// and skipped; the stream only fails on transport errors.
fn decode_stream(
    bytes: impl futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl futures::Stream<Item = Result<CompletionEvent, CompletionError>> + Send + 'static {
    async_stream::try_stream! {
        let mut buf = String::new();
        let mut tool_name: Option<String> = None;
        let mut tool_args = String::new();

        futures_util::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(CompletionError::Request)?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buf.find('\n') {
                let line: String = buf.drain(..=pos).collect();
                let line = line.trim_end();
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim_start();

                if payload == "[DONE]" {
                    if let Some(name) = tool_name.take() {
                        yield CompletionEvent::ToolCall {
                            name,
                            arguments: std::mem::take(&mut tool_args),
                        };
                    }
                    yield CompletionEvent::Done;
                    return;
                }

                let chunk: StreamChunk = match serde_json::from_str(payload) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Skipping unparseable completion chunk: {e}");
                        continue;
                    }
                };

                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield CompletionEvent::Content(content);
                        }
                    }
                    for call in choice.delta.tool_calls.unwrap_or_default() {
                        let Some(function) = call.function else {
                            continue;
                        };
                        if let Some(name) = function.name {
                            tool_name = Some(name);
                        }
                        if let Some(fragment) = function.arguments {
                            tool_args.push_str(&fragment);
                        }
                    }
                    if choice.finish_reason.as_deref() == Some("tool_calls") {
                        if let Some(name) = tool_name.take() {
                            yield CompletionEvent::ToolCall {
                                name,
                                arguments: std::mem::take(&mut tool_args),
                            };
                        }
                    }
                }
            }
        }

        // Upstream closed without a [DONE] marker; treat as completion so a
        // lenient service still terminates the conversation cleanly.
        if let Some(name) = tool_name.take() {
            yield CompletionEvent::ToolCall {
                name,
                arguments: std::mem::take(&mut tool_args),
            };
        }
        yield CompletionEvent::Done;
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn byte_stream(
        chunks: Vec<&'static str>,
    ) -> impl futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<Bytes, reqwest::Error>(Bytes::from_static(c.as_bytes()))),
        )
    }

    async fn collect(
        chunks: Vec<&'static str>,
    ) -> Vec<Result<CompletionEvent, CompletionError>> {
        decode_stream(byte_stream(chunks)).collect().await
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = CompletionClient::new(
            "https://api.example.com/v1/".to_string(),
            None,
            "test-model".to_string(),
        );
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_decode_content_and_done() {
        let events = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;

        let events: Vec<_> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![
                CompletionEvent::Content("Hel".to_string()),
                CompletionEvent::Content("lo".to_string()),
                CompletionEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_reassembles_split_lines() {
        let events = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"hi\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;
        let events: Vec<_> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![CompletionEvent::Content("hi".to_string()), CompletionEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_decode_accumulates_tool_call_fragments() {
        let events = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"function\":{\"name\":\"set_recipe\",\"arguments\":\"{\\\"ti\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"function\":{\"arguments\":\"tle\\\":\\\"x\\\"}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        let events: Vec<_> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![
                CompletionEvent::ToolCall {
                    name: "set_recipe".to_string(),
                    arguments: "{\"title\":\"x\"}".to_string(),
                },
                CompletionEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_skips_malformed_payload_lines() {
        let events = collect(vec![
            "data: {broken\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;
        let events: Vec<_> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![CompletionEvent::Content("ok".to_string()), CompletionEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_decode_eof_without_done_still_terminates() {
        let events = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
        ])
        .await;
        let events: Vec<_> = events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(events.last(), Some(&CompletionEvent::Done));
    }
}
