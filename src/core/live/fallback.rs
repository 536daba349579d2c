//! Degraded-mode binding over the Completion Service.
//!
//! When the Live Session Service cannot be reached the session still comes
//! up: this binding synthesizes one utterance per request through the
//! single-shot Completion Service. There is no speech recognition on this
//! path, so caller audio produces a fixed acknowledgement utterance instead
//! of a transcription, keeping the client-facing protocol uniform.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::base::{Binding, BindingEvent, BindingMode, BindingResult};
use crate::core::completion::{
    ChatTurn, CompletionClient, HistoryWindow, build_system_prompt,
};
use crate::core::recipe::RecipeSnapshot;

/// Instruction used to synthesize the session-opening greeting.
const GREETING_PROMPT: &str =
    "Greet the user and offer to help with the recipe they are viewing. One or two sentences.";

/// Instruction used to acknowledge audio that cannot be transcribed.
const AUDIO_ACK_PROMPT: &str =
    "The user just said something out loud, but voice understanding is unavailable right now. \
     Briefly acknowledge them and ask them to type their request instead.";

/// Per-utterance Completion Service binding.
pub struct FallbackBinding {
    completion: CompletionClient,
    events: mpsc::Sender<BindingEvent>,
    instructions: Option<String>,
    recipe: Option<RecipeSnapshot>,
    history: Arc<Mutex<HistoryWindow>>,
    utterance_in_flight: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl FallbackBinding {
    /// Bind a session to the fallback path, carrying over whatever
    /// conversation history the session had accumulated.
    pub fn new(
        completion: CompletionClient,
        events: mpsc::Sender<BindingEvent>,
        history: HistoryWindow,
    ) -> Self {
        Self {
            completion,
            events,
            instructions: None,
            recipe: None,
            history: Arc::new(Mutex::new(history)),
            utterance_in_flight: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Synthesize the session-opening greeting in the background.
    ///
    /// A greeting failure is logged, never surfaced: the degraded path must
    /// not look like a failure to the user.
    pub fn spawn_greeting(&self) {
        self.spawn_utterance(GREETING_PROMPT);
    }

    fn spawn_utterance(&self, prompt: &'static str) {
        let messages = self.build_messages(prompt);
        let completion = self.completion.clone();
        let events = self.events.clone();
        let history = self.history.clone();
        let in_flight = self.utterance_in_flight.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            let result = completion.complete(&messages).await;
            in_flight.store(false, Ordering::SeqCst);
            match result {
                Ok(text) => {
                    if closed.load(Ordering::SeqCst) {
                        debug!("Dropping fallback utterance for closed session");
                        return;
                    }
                    history.lock().push(ChatTurn::assistant(text.clone()));
                    let _ = events
                        .send(BindingEvent::AssistantTranscript {
                            text,
                            is_final: true,
                        })
                        .await;
                }
                Err(e) => {
                    warn!("Fallback utterance failed: {e}");
                }
            }
        });
    }

    fn build_messages(&self, prompt: &str) -> Vec<ChatTurn> {
        let mut messages = vec![ChatTurn::system(build_system_prompt(
            self.instructions.as_deref(),
            self.recipe.as_ref(),
        ))];
        messages.extend(self.history.lock().iter().cloned());
        messages.push(ChatTurn::user(prompt));
        messages
    }
}

#[async_trait]
impl Binding for FallbackBinding {
    fn mode(&self) -> BindingMode {
        BindingMode::Degraded
    }

    /// Caller audio cannot be transcribed here; it triggers at most one
    /// acknowledgement utterance at a time, and frames arriving while one is
    /// pending are dropped.
    async fn send_audio(&mut self, _audio: Bytes) -> BindingResult<()> {
        if self.utterance_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Acknowledgement already pending, dropping audio frame");
            return Ok(());
        }
        self.spawn_utterance(AUDIO_ACK_PROMPT);
        Ok(())
    }

    async fn apply_setup(
        &mut self,
        instructions: Option<String>,
        recipe: Option<RecipeSnapshot>,
    ) -> BindingResult<()> {
        self.instructions = instructions;
        self.recipe = recipe;
        Ok(())
    }

    async fn close(&mut self) -> BindingResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::completion::HISTORY_LIMIT;

    fn test_binding() -> (FallbackBinding, mpsc::Receiver<BindingEvent>) {
        let (events_tx, events_rx) = mpsc::channel(8);
        let completion = CompletionClient::new(
            "http://127.0.0.1:1/v1".to_string(),
            None,
            "test-model".to_string(),
        );
        (
            FallbackBinding::new(completion, events_tx, HistoryWindow::new()),
            events_rx,
        )
    }

    #[test]
    fn test_prompt_assembly_is_bounded_and_ordered() {
        let (mut binding, _rx) = test_binding();
        {
            let mut history = binding.history.lock();
            for i in 0..30 {
                history.push(ChatTurn::user(format!("turn {i}")));
            }
        }
        binding.instructions = Some("Stay vegetarian.".to_string());

        let messages = binding.build_messages(AUDIO_ACK_PROMPT);
        // system + capped history + the fixed utterance prompt
        assert_eq!(messages.len(), 1 + HISTORY_LIMIT + 1);
        assert!(messages[0].content.contains("Stay vegetarian."));
        assert_eq!(messages[1].content, "turn 20");
        assert_eq!(messages[HISTORY_LIMIT].content, "turn 29");
        assert_eq!(messages.last().expect("prompt").content, AUDIO_ACK_PROMPT);
    }

    #[tokio::test]
    async fn test_audio_while_utterance_pending_is_dropped() {
        let (mut binding, _rx) = test_binding();
        binding.utterance_in_flight.store(true, Ordering::SeqCst);

        // Must not spawn a second utterance; flag stays set
        binding
            .send_audio(Bytes::from_static(b"\x00\x01"))
            .await
            .expect("send");
        assert!(binding.utterance_in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_mode_and_close_are_infallible() {
        let (mut binding, _rx) = test_binding();
        assert_eq!(binding.mode(), BindingMode::Degraded);
        binding.close().await.expect("close");
        assert!(binding.closed.load(Ordering::SeqCst));
    }
}
