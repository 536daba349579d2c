//! Live Session Service attachment.
//!
//! The live service is a bidirectional WebSocket conversational AI API:
//! JSON events tagged by `type`, audio base64-encoded inside events, tool
//! calls surfaced as structured events. This client owns the upstream socket
//! for one voice session, translating between that wire and the neutral
//! [`BindingEvent`] stream the session bridge consumes.
//!
//! There is no mid-session reconnect: a lost upstream socket ends the
//! session, and the client must establish a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::base::{Binding, BindingError, BindingEvent, BindingMode, BindingResult};
use crate::core::completion::build_system_prompt;
use crate::core::recipe::{RecipeSnapshot, SET_RECIPE_TOOL, set_recipe_schema};

/// Outgoing channel capacity toward the upstream socket.
const UPSTREAM_CHANNEL_CAPACITY: usize = 256;

/// Connection settings for the Live Session Service.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint, e.g. `wss://api.openai.com/v1/realtime`
    pub url: String,
    /// Bearer token, when the service requires one
    pub api_key: Option<String>,
    /// Model identifier appended as a query parameter
    pub model: String,
    /// Grounding instructions applied at attach time
    pub instructions: String,
    /// Handshake deadline
    pub connect_timeout: Duration,
}

/// WebSocket attachment to the Live Session Service.
pub struct LiveBinding {
    outgoing: Option<mpsc::Sender<ClientEvent>>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LiveBinding {
    /// Establish the upstream attachment and complete the opening handshake.
    ///
    /// Upstream events are delivered on `events` in emission order until the
    /// socket closes. Any failure here is the caller's cue to fall back.
    pub async fn connect(
        config: LiveConfig,
        events: mpsc::Sender<BindingEvent>,
    ) -> BindingResult<Self> {
        let url = format!(
            "{}?model={}",
            config.url.trim_end_matches('/'),
            config.model
        );
        let host = Url::parse(&url)
            .map_err(|e| BindingError::ConnectionFailed(format!("invalid url {url}: {e}")))?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| BindingError::ConnectionFailed(format!("url {url} has no host")))?;

        let mut request = http::Request::builder()
            .uri(&url)
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);
        if let Some(key) = &config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let request = request
            .body(())
            .map_err(|e| BindingError::ConnectionFailed(e.to_string()))?;

        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    BindingError::ConnectionFailed("live session handshake timed out".to_string())
                })?
                .map_err(|e| BindingError::ConnectionFailed(e.to_string()))?;

        info!("Attached to live session service");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientEvent>(UPSTREAM_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let task_connected = connected.clone();
        let task = tokio::spawn(async move {
            // Accumulated assistant transcript for the in-progress response
            let mut assistant_transcript = String::new();
            // call_id -> tool name, filled by output_item.added
            let mut pending_tool_calls: HashMap<String, String> = HashMap::new();

            loop {
                tokio::select! {
                    outgoing = rx.recv() => {
                        let Some(event) = outgoing else {
                            // Binding dropped the sender: session is closing
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        };
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Failed to serialize upstream event: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            let _ = events
                                .send(BindingEvent::Error(format!("upstream send failed: {e}")))
                                .await;
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if !dispatch_server_event(
                                            event,
                                            &events,
                                            &mut assistant_transcript,
                                            &mut pending_tool_calls,
                                        )
                                        .await
                                        {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!("Failed to parse upstream event: {e}");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    warn!("Failed to answer upstream ping: {e}");
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                info!("Live session service closed the connection");
                                break;
                            }
                            Some(Err(e)) => {
                                let _ = events
                                    .send(BindingEvent::Error(format!("upstream socket error: {e}")))
                                    .await;
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }

            task_connected.store(false, Ordering::SeqCst);
            let _ = events.send(BindingEvent::Closed).await;
        });

        let binding = Self {
            outgoing: Some(tx),
            connected,
            task: Some(task),
        };
        binding
            .send_event(ClientEvent::SessionUpdate {
                session: SessionConfig::new(&config.instructions),
            })
            .await?;

        Ok(binding)
    }

    async fn send_event(&self, event: ClientEvent) -> BindingResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BindingError::NotConnected);
        }
        let Some(tx) = &self.outgoing else {
            return Err(BindingError::NotConnected);
        };
        tx.send(event).await.map_err(|_| BindingError::NotConnected)
    }
}

#[async_trait]
impl Binding for LiveBinding {
    fn mode(&self) -> BindingMode {
        BindingMode::Live
    }

    async fn send_audio(&mut self, audio: Bytes) -> BindingResult<()> {
        self.send_event(ClientEvent::AudioAppend {
            audio: BASE64_STANDARD.encode(&audio),
        })
        .await
    }

    async fn apply_setup(
        &mut self,
        instructions: Option<String>,
        recipe: Option<RecipeSnapshot>,
    ) -> BindingResult<()> {
        let grounding = build_system_prompt(instructions.as_deref(), recipe.as_ref());
        self.send_event(ClientEvent::SessionUpdate {
            session: SessionConfig::new(&grounding),
        })
        .await
    }

    async fn close(&mut self) -> BindingResult<()> {
        // Dropping the sender makes the socket task send a Close frame and end
        self.outgoing.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

/// Route one upstream event onto the binding event channel.
///
/// Returns `false` when the bridge side is gone and the socket task should
/// stop forwarding.
async fn dispatch_server_event(
    event: ServerEvent,
    events: &mpsc::Sender<BindingEvent>,
    assistant_transcript: &mut String,
    pending_tool_calls: &mut HashMap<String, String>,
) -> bool {
    let forwarded = match event {
        ServerEvent::SessionCreated { session } => {
            info!("Live session created: {}", session.id);
            return true;
        }
        ServerEvent::Error { error } => {
            warn!("Live session error: {} - {}", error.error_type, error.message);
            events
                .send(BindingEvent::Error(format!(
                    "{}: {}",
                    error.error_type, error.message
                )))
                .await
        }
        ServerEvent::AudioDelta { delta } => match BASE64_STANDARD.decode(&delta) {
            Ok(audio) => events.send(BindingEvent::Audio(Bytes::from(audio))).await,
            Err(e) => {
                warn!("Failed to decode audio delta: {e}");
                return true;
            }
        },
        ServerEvent::TranscriptDelta { delta } => {
            assistant_transcript.push_str(&delta);
            events
                .send(BindingEvent::AssistantTranscript {
                    text: assistant_transcript.clone(),
                    is_final: false,
                })
                .await
        }
        ServerEvent::TranscriptDone { transcript } => {
            assistant_transcript.clear();
            events
                .send(BindingEvent::AssistantTranscript {
                    text: transcript,
                    is_final: true,
                })
                .await
        }
        ServerEvent::InputTranscription { transcript } => {
            events.send(BindingEvent::UserTranscript { text: transcript }).await
        }
        ServerEvent::OutputItemAdded { item } => {
            if item.item_type == "function_call"
                && let (Some(call_id), Some(name)) = (item.call_id, item.name)
            {
                debug!("Tracking tool call {call_id} -> {name}");
                pending_tool_calls.insert(call_id, name);
            }
            return true;
        }
        ServerEvent::FunctionCallDone { call_id, arguments } => {
            let name = pending_tool_calls.remove(&call_id).unwrap_or_else(|| {
                warn!("Tool name unknown for call_id {call_id}");
                String::new()
            });
            events.send(BindingEvent::ToolCall { name, arguments }).await
        }
        ServerEvent::Unknown => {
            trace!("Ignoring unhandled upstream event");
            return true;
        }
    };
    forwarded.is_ok()
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    AudioAppend { audio: String },
}

#[derive(Debug, Serialize)]
struct SessionConfig {
    modalities: Vec<String>,
    instructions: String,
    input_audio_format: String,
    output_audio_format: String,
    input_audio_transcription: TranscriptionConfig,
    tools: Vec<ToolDef>,
}

impl SessionConfig {
    fn new(instructions: &str) -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: instructions.to_string(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            input_audio_transcription: TranscriptionConfig {
                model: "whisper-1".to_string(),
            },
            tools: vec![ToolDef {
                tool_type: "function".to_string(),
                name: SET_RECIPE_TOOL.to_string(),
                description: "Replace the recipe the user is looking at with an updated version"
                    .to_string(),
                parameters: set_recipe_schema(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct TranscriptionConfig {
    model: String,
}

#[derive(Debug, Serialize)]
struct ToolDef {
    #[serde(rename = "type")]
    tool_type: String,
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    #[serde(rename = "error")]
    Error { error: ErrorInfo },

    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta { delta: String },

    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone { transcript: String },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscription { transcript: String },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallDone { call_id: String, arguments: String },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    #[serde(default, rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failure_is_an_error_not_a_panic() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let config = LiveConfig {
            // Nothing listens here; the handshake must fail fast
            url: "ws://127.0.0.1:1".to_string(),
            api_key: None,
            model: "test-model".to_string(),
            instructions: String::new(),
            connect_timeout: Duration::from_millis(500),
        };
        let result = LiveBinding::connect(config, events_tx).await;
        assert!(matches!(result, Err(BindingError::ConnectionFailed(_))));
    }

    #[test]
    fn test_client_event_wire_tags() {
        let json = serde_json::to_value(ClientEvent::AudioAppend {
            audio: "AAAA".to_string(),
        })
        .expect("serialize");
        assert_eq!(json["type"], "input_audio_buffer.append");
        assert_eq!(json["audio"], "AAAA");
    }

    #[test]
    fn test_session_config_advertises_recipe_tool() {
        let config = SessionConfig::new("Be concise.");
        assert_eq!(config.instructions, "Be concise.");
        assert_eq!(config.tools[0].name, SET_RECIPE_TOOL);
        assert_eq!(config.input_audio_format, "pcm16");
        assert_eq!(config.output_audio_format, "pcm16");
    }

    #[test]
    fn test_server_event_parsing() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.audio_transcript.delta","delta":"Hel"}"#,
        )
        .expect("parse");
        assert!(matches!(event, ServerEvent::TranscriptDelta { ref delta } if delta == "Hel"));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.function_call_arguments.done","call_id":"c1","arguments":"{}"}"#,
        )
        .expect("parse");
        assert!(matches!(event, ServerEvent::FunctionCallDone { .. }));
    }

    #[test]
    fn test_unknown_server_event_fails_closed() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","limits":[]}"#).expect("parse");
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[tokio::test]
    async fn test_tool_call_dispatch_pairs_name_with_arguments() {
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let mut transcript = String::new();
        let mut pending = HashMap::new();

        let added: ServerEvent = serde_json::from_str(
            r#"{"type":"response.output_item.added","item":{"type":"function_call","call_id":"c1","name":"set_recipe"}}"#,
        )
        .expect("parse");
        assert!(dispatch_server_event(added, &events_tx, &mut transcript, &mut pending).await);

        let done = ServerEvent::FunctionCallDone {
            call_id: "c1".to_string(),
            arguments: "{\"title\":\"x\"}".to_string(),
        };
        assert!(dispatch_server_event(done, &events_tx, &mut transcript, &mut pending).await);

        match events_rx.recv().await.expect("event") {
            BindingEvent::ToolCall { name, arguments } => {
                assert_eq!(name, "set_recipe");
                assert_eq!(arguments, "{\"title\":\"x\"}");
            }
            other => panic!("Expected ToolCall, got {other:?}"),
        }
        assert!(pending.is_empty());
    }
}
