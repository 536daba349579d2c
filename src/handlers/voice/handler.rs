//! Voice WebSocket session bridge.
//!
//! One state machine per connection: the socket opens, the bridge attaches
//! to the Live Session Service (or falls back to per-utterance completions),
//! and from then on it translates between the client wire format and the
//! upstream binding until either side goes away.
//!
//! Upstream failures after attachment are not retried: the session moves to
//! closing and the client must reconnect for a fresh one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{IncomingControl, MessageRoute, OutgoingControl};
use super::session::{BridgeState, ConversationSession};
use crate::core::completion::{ChatTurn, HistoryWindow, build_system_prompt};
use crate::core::live::{
    Binding, BindingEvent, BindingMode, BoxedBinding, FallbackBinding, LiveBinding, LiveConfig,
};
use crate::core::recipe::parse_set_recipe;
use crate::state::AppState;

/// Writer-channel depth for audio-heavy sessions
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (2 MB)
const MAX_WS_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Maximum WebSocket message size (2 MB)
const MAX_WS_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// How often the idle deadline is checked
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Body of the one `connected` frame, identical on both binding paths
const CONNECTED_MESSAGE: &str = "Cooking assistant connected.";

/// Voice WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket for the bidirectional voice
/// channel: JSON control frames plus raw binary PCM16 audio in both
/// directions.
pub async fn voice_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Voice WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_voice_socket(socket, state))
}

/// Drive one voice session from open to close.
async fn handle_voice_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let mut session = ConversationSession::new();
    let handle = app_state.sessions.register(session.id);
    info!(session_id = %session.id, "Voice session opened");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Writer task: everything leaving the socket funnels through here
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, MessageRoute::Close);

            let result = match route {
                MessageRoute::Control(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize control message: {e}");
                        continue;
                    }
                },
                MessageRoute::Audio(data) => sender.send(Message::Binary(data)).await,
                MessageRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {e}");
                break;
            }
            if should_close {
                break;
            }
        }
    });

    session.transition(&handle, BridgeState::Connecting);

    let (event_tx, mut event_rx) = mpsc::channel::<BindingEvent>(CHANNEL_BUFFER_SIZE);
    let mut binding = establish_binding(&app_state, event_tx).await;
    match binding.mode() {
        BindingMode::Live => session.transition(&handle, BridgeState::LiveActive),
        BindingMode::Degraded => session.transition(&handle, BridgeState::DegradedActive),
    }

    // Exactly one connected frame per session, live or degraded
    let _ = message_tx
        .send(MessageRoute::Control(OutgoingControl::Connected {
            message: CONNECTED_MESSAGE.to_string(),
        }))
        .await;

    let idle_timeout = app_state.config.idle_timeout();
    let mut last_activity = Instant::now();

    loop {
        select! {
            client_msg = receiver.next() => {
                last_activity = Instant::now();
                match client_msg {
                    Some(Ok(msg)) => {
                        let keep_going = process_client_message(
                            msg,
                            &mut session,
                            binding.as_mut(),
                            &message_tx,
                            &app_state,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session.id, "Voice WebSocket error: {e}");
                        break;
                    }
                    None => {
                        info!(session_id = %session.id, "Voice WebSocket closed by client");
                        break;
                    }
                }
            }

            event = event_rx.recv() => {
                last_activity = Instant::now();
                match event {
                    Some(event) => {
                        let keep_going =
                            relay_binding_event(event, &mut session, &message_tx, &app_state).await;
                        if !keep_going {
                            break;
                        }
                    }
                    None => {
                        info!(session_id = %session.id, "Upstream event channel closed");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(
                        session_id = %session.id,
                        "Voice session idle for {}s, closing",
                        last_activity.elapsed().as_secs()
                    );
                    let _ = message_tx
                        .send(MessageRoute::Control(OutgoingControl::Error {
                            message: "Connection closed due to inactivity".to_string(),
                        }))
                        .await;
                    break;
                }
                debug!(session_id = %session.id, "Voice session idle check - still active");
            }

            _ = handle.cancel.cancelled() => {
                info!(session_id = %session.id, "Voice session shutdown requested");
                break;
            }
        }
    }

    // Cleanup: close the upstream binding, flush the close frame, drop the
    // registry entry. Buffered audio dies with the channels.
    session.transition(&handle, BridgeState::Closing);
    if let Err(e) = binding.close().await {
        error!(session_id = %session.id, "Failed to close upstream binding: {e}");
    }
    let _ = message_tx.send(MessageRoute::Close).await;
    drop(message_tx);
    let _ = sender_task.await;

    app_state.sessions.remove(session.id);
    session.transition(&handle, BridgeState::Closed);
    info!(session_id = %session.id, "Voice session terminated");
}

/// Attach the session to its upstream.
///
/// A failed live attachment is never fatal: the session binds to the
/// completion fallback instead and synthesizes a greeting there.
async fn establish_binding(
    app_state: &Arc<AppState>,
    events: mpsc::Sender<BindingEvent>,
) -> BoxedBinding {
    let config = &app_state.config;
    let live_config = LiveConfig {
        url: config.live_api_url.clone(),
        api_key: config.live_api_key.clone(),
        model: config.live_model.clone(),
        instructions: build_system_prompt(config.assistant_instructions.as_deref(), None),
        connect_timeout: config.connect_timeout(),
    };

    match LiveBinding::connect(live_config, events.clone()).await {
        Ok(live) => Box::new(live),
        Err(e) => {
            warn!("Live session service unavailable, entering degraded mode: {e}");
            let fallback =
                FallbackBinding::new(app_state.completion.clone(), events, HistoryWindow::new());
            fallback.spawn_greeting();
            Box::new(fallback)
        }
    }
}

/// Process one frame from the client. Returns `false` to end the session.
async fn process_client_message(
    msg: Message,
    session: &mut ConversationSession,
    binding: &mut dyn Binding,
    message_tx: &mpsc::Sender<MessageRoute>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let control: IncomingControl = match serde_json::from_str(&text) {
                Ok(control) => control,
                Err(e) => {
                    // Unknown or malformed control frames fail closed
                    warn!(session_id = %session.id, "Ignoring unparseable control frame: {e}");
                    return true;
                }
            };

            if let Err(e) = control.validate_size() {
                warn!(session_id = %session.id, "Control message rejected: {e}");
                let _ = message_tx
                    .send(MessageRoute::Control(OutgoingControl::Error {
                        message: e.to_string(),
                    }))
                    .await;
                return true;
            }

            let IncomingControl::SessionSetup {
                current_recipe,
                instructions,
            } = control;

            if let Some(recipe) = &current_recipe {
                // A freshly loaded recipe replaces the document unconditionally
                app_state.recipes.replace(recipe.clone());
            }
            session.current_recipe = current_recipe.clone();

            if let Err(e) = binding.apply_setup(instructions, current_recipe).await {
                warn!(session_id = %session.id, "Failed to apply session setup upstream: {e}");
            }
            true
        }

        Message::Binary(data) => {
            debug!(session_id = %session.id, "Received {} bytes of caller audio", data.len());
            if let Err(e) = binding.send_audio(data).await {
                warn!(session_id = %session.id, "Upstream rejected audio: {e}");
                let _ = message_tx
                    .send(MessageRoute::Control(OutgoingControl::Error {
                        message: "Voice upstream unavailable".to_string(),
                    }))
                    .await;
                return false;
            }
            true
        }

        Message::Ping(_) | Message::Pong(_) => true,

        Message::Close(_) => {
            info!(session_id = %session.id, "Voice WebSocket close received");
            false
        }
    }
}

/// Relay one upstream event to the client. Returns `false` to end the session.
async fn relay_binding_event(
    event: BindingEvent,
    session: &mut ConversationSession,
    message_tx: &mpsc::Sender<MessageRoute>,
    app_state: &Arc<AppState>,
) -> bool {
    match event {
        BindingEvent::UserTranscript { text } => {
            session.push_turn(ChatTurn::user(text.clone()));
            message_tx
                .send(MessageRoute::Control(OutgoingControl::Transcript { text }))
                .await
                .is_ok()
        }

        BindingEvent::AssistantTranscript { text, is_final } => {
            // The client wire carries finals only; partials stay server-side
            if !is_final {
                return true;
            }
            session.push_turn(ChatTurn::assistant(text.clone()));
            message_tx
                .send(MessageRoute::Control(OutgoingControl::ResponseTranscript {
                    text,
                }))
                .await
                .is_ok()
        }

        BindingEvent::Audio(data) => message_tx.send(MessageRoute::Audio(data)).await.is_ok(),

        BindingEvent::ToolCall { name, arguments } => {
            match parse_set_recipe(&name, &arguments) {
                Ok(draft) => {
                    let snapshot = session.apply_recipe(draft, &app_state.recipes);
                    info!(
                        session_id = %session.id,
                        recipe_id = %snapshot.id,
                        last_updated = snapshot.last_updated,
                        "Recipe updated by voice tool call"
                    );
                    message_tx
                        .send(MessageRoute::Control(OutgoingControl::RecipeUpdate {
                            recipe: snapshot,
                        }))
                        .await
                        .is_ok()
                }
                Err(e) => {
                    // The conversation continues without a recipe mutation
                    warn!(session_id = %session.id, "Dropping malformed tool call: {e}");
                    true
                }
            }
        }

        BindingEvent::Error(message) => {
            error!(session_id = %session.id, "Upstream binding failed: {message}");
            let _ = message_tx
                .send(MessageRoute::Control(OutgoingControl::Error {
                    message: "Voice upstream error".to_string(),
                }))
                .await;
            false
        }

        BindingEvent::Closed => {
            info!(session_id = %session.id, "Upstream binding closed");
            false
        }
    }
}
