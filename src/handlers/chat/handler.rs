//! Chat stream responder.
//!
//! Each `POST /chat` request gets its own Completion Service stream and its
//! own chunked response body. Frame ordering is enforced here: content
//! fragments as they arrive, at most one recipe update, exactly one terminal
//! frame as the last thing on the wire. If the client aborts, the body
//! stream is dropped and with it the upstream request, releasing the
//! Completion Service without a terminal frame.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use futures_util::StreamExt;
use tracing::{error, info, warn};

use super::events::{ChatRequest, StreamEvent};
use crate::core::completion::{
    ChatRole, ChatTurn, CompletionEvent, HistoryWindow, build_system_prompt,
};
use crate::core::recipe::{next_version, parse_set_recipe};
use crate::errors::AppError;
use crate::state::AppState;

/// Error frame body; the cause is logged server-side, not sent to the client.
const STREAM_ERROR_MESSAGE: &str = "The assistant is unavailable right now.";

/// Chat streaming handler
///
/// Responds with a `text/event-stream`-style chunked body of
/// `data: <json>\n\n` frames; see [`StreamEvent`] for the frame grammar.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }

    info!(
        history_len = request.conversation_history.len(),
        has_recipe = request.current_recipe.is_some(),
        "Chat stream requested"
    );

    let messages = build_messages(&state, &request);
    let body = Body::from_stream(respond(state, request, messages));

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .map_err(|e| AppError::Internal(e.into()))
}

/// Assemble the completion request from the client's view of the conversation.
///
/// The history already includes the just-submitted user message; if a client
/// sent it without (an empty history, say), the message is appended so the
/// model always sees it last.
fn build_messages(state: &AppState, request: &ChatRequest) -> Vec<ChatTurn> {
    let mut messages = vec![ChatTurn::system(build_system_prompt(
        state.config.assistant_instructions.as_deref(),
        request.current_recipe.as_ref(),
    ))];

    let window = HistoryWindow::from_turns(request.conversation_history.iter().cloned());
    messages.extend(window.iter().cloned());

    let has_trailing_message = messages
        .last()
        .is_some_and(|turn| turn.role == ChatRole::User && turn.content == request.message);
    if !has_trailing_message {
        messages.push(ChatTurn::user(request.message.clone()));
    }
    messages
}

/// Produce the frame stream for one request.
fn respond(
    state: Arc<AppState>,
    request: ChatRequest,
    messages: Vec<ChatTurn>,
) -> impl futures::Stream<Item = Result<bytes::Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut upstream = match state.completion.stream(messages, true).await {
            Ok(upstream) => upstream,
            Err(e) => {
                error!("Completion stream could not be started: {e}");
                yield Ok(StreamEvent::Error {
                    message: STREAM_ERROR_MESSAGE.to_string(),
                }
                .encode());
                return;
            }
        };

        let mut recipe_sent = false;
        let mut failed = false;

        while let Some(event) = upstream.next().await {
            match event {
                Ok(CompletionEvent::Content(content)) => {
                    if !content.is_empty() {
                        yield Ok(StreamEvent::Content { content }.encode());
                    }
                }

                Ok(CompletionEvent::ToolCall { name, arguments }) => {
                    match parse_set_recipe(&name, &arguments) {
                        Ok(draft) => {
                            if recipe_sent {
                                warn!("Ignoring extra recipe update in one reply");
                                continue;
                            }
                            let id = request
                                .current_recipe
                                .as_ref()
                                .map(|recipe| recipe.id.clone())
                                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                            let prev = request
                                .current_recipe
                                .as_ref()
                                .map(|recipe| recipe.last_updated)
                                .into_iter()
                                .chain(state.recipes.get(&id).map(|doc| doc.last_updated))
                                .max();
                            let snapshot = draft.into_snapshot(id, next_version(prev));
                            state.recipes.apply_if_newer(snapshot.clone());
                            info!(
                                recipe_id = %snapshot.id,
                                last_updated = snapshot.last_updated,
                                "Recipe updated by chat tool call"
                            );
                            recipe_sent = true;
                            yield Ok(StreamEvent::RecipeUpdate { recipe: snapshot }.encode());
                        }
                        Err(e) => {
                            // The reply continues without a recipe mutation
                            warn!("Dropping malformed tool call: {e}");
                        }
                    }
                }

                Ok(CompletionEvent::Done) => break,

                Err(e) => {
                    error!("Completion stream failed: {e}");
                    yield Ok(StreamEvent::Error {
                        message: STREAM_ERROR_MESSAGE.to_string(),
                    }
                    .encode());
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            yield Ok(StreamEvent::Done.encode());
        }
    }
}
