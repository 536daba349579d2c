//! Audio transport client.
//!
//! Owns the client end of the voice WebSocket: sends the `session_setup`
//! control frame and then binary PCM16 frames, and turns everything coming
//! back into [`VoiceClientEvent`]s for the UI. Capture-side framing runs on
//! the real-time audio thread through [`CaptureBridge`], which talks to the
//! transport only over a bounded channel.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::core::audio::{AudioFrame, FRAME_SAMPLES, PcmEncoder};
use crate::core::recipe::{RecipeSnapshot, RecipeStore};
use crate::handlers::voice::{IncomingControl, OutgoingControl};

/// Queue depth between the capture thread and the transport.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Queue depth toward the UI.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors from the voice transport.
#[derive(Debug, Error)]
pub enum VoiceClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Events surfaced to the UI from the voice channel.
#[derive(Debug)]
pub enum VoiceClientEvent {
    /// Session is up
    Connected { message: String },
    /// What the assistant heard the user say
    UserTranscript { text: String },
    /// What the assistant said
    AssistantTranscript { text: String },
    /// A recipe update that passed the version check and was applied
    RecipeUpdated(RecipeSnapshot),
    /// Response audio for playback, PCM16 mono little-endian
    Audio(Bytes),
    /// Session-fatal error
    Error { message: String },
    /// Connection ended
    Closed,
}

/// Capture-callback-side framing.
///
/// Lives on the real-time audio thread. Never blocks and never shares
/// memory with the UI side: finished frames go over a bounded channel, and
/// frames that do not fit are dropped and counted.
#[derive(Debug)]
pub struct CaptureBridge {
    encoder: PcmEncoder,
    frames: mpsc::Sender<AudioFrame>,
    dropped: u64,
}

impl CaptureBridge {
    pub fn new(frames: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            encoder: PcmEncoder::new(FRAME_SAMPLES),
            frames,
            dropped: 0,
        }
    }

    /// Feed one hardware capture block.
    ///
    /// Always returns `true`; the audio graph must keep running whatever
    /// happens downstream.
    pub fn on_audio_block(&mut self, block: &[f32]) -> bool {
        let frames = &self.frames;
        let mut newly_dropped = 0u64;
        self.encoder.process(block, |frame| {
            if frames.try_send(frame).is_err() {
                newly_dropped += 1;
            }
        });
        if newly_dropped > 0 {
            self.dropped += newly_dropped;
            debug!("Dropped {newly_dropped} audio frames (transport backlogged)");
        }
        true
    }

    /// Frames discarded because the transport queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

/// Client end of the voice WebSocket.
pub struct VoiceClient {
    frames: mpsc::Sender<AudioFrame>,
    writer_task: JoinHandle<()>,
    reader_task: JoinHandle<()>,
}

impl VoiceClient {
    /// Open the voice channel and send the `session_setup` frame.
    ///
    /// Recipe updates arriving on this channel are applied to `store` under
    /// the version rule before being surfaced; stale ones are discarded.
    pub async fn connect(
        url: &str,
        current_recipe: Option<RecipeSnapshot>,
        instructions: Option<String>,
        store: Arc<RecipeStore>,
    ) -> Result<(Self, mpsc::Receiver<VoiceClientEvent>), VoiceClientError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| VoiceClientError::ConnectionFailed(e.to_string()))?;
        info!("Voice channel connected");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let setup = IncomingControl::SessionSetup {
            current_recipe,
            instructions,
        };
        let setup_json = serde_json::to_string(&setup)
            .map_err(|e| VoiceClientError::ConnectionFailed(e.to_string()))?;
        ws_sink
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| VoiceClientError::ConnectionFailed(e.to_string()))?;

        let (frame_tx, mut frame_rx) = mpsc::channel::<AudioFrame>(FRAME_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<VoiceClientEvent>(EVENT_CHANNEL_CAPACITY);

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Binary(frame.into_pcm())).await {
                    warn!("Failed to send audio frame: {e}");
                    return;
                }
            }
            // Frame sender dropped: the session is closing
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        let reader_task = tokio::spawn(async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let control: OutgoingControl = match serde_json::from_str(&text) {
                            Ok(control) => control,
                            Err(e) => {
                                warn!("Ignoring unparseable control frame: {e}");
                                continue;
                            }
                        };
                        if let Some(event) = control_to_event(control, &store)
                            && event_tx.send(event).await.is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if event_tx.send(VoiceClientEvent::Audio(data)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx
                            .send(VoiceClientEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
            let _ = event_tx.send(VoiceClientEvent::Closed).await;
        });

        Ok((
            Self {
                frames: frame_tx,
                writer_task,
                reader_task,
            },
            event_rx,
        ))
    }

    /// Sender for the capture side; hand it to a [`CaptureBridge`].
    pub fn frame_sender(&self) -> mpsc::Sender<AudioFrame> {
        self.frames.clone()
    }

    /// Close the channel, discarding any frames still queued.
    pub async fn close(self) {
        drop(self.frames);
        let _ = self.writer_task.await;
        self.reader_task.abort();
        let _ = self.reader_task.await;
    }
}

/// Map a server control frame to a UI event, applying recipe updates to the
/// shared store on the way through. Stale updates map to nothing.
fn control_to_event(control: OutgoingControl, store: &RecipeStore) -> Option<VoiceClientEvent> {
    match control {
        OutgoingControl::Connected { message } => Some(VoiceClientEvent::Connected { message }),
        OutgoingControl::Transcript { text } => Some(VoiceClientEvent::UserTranscript { text }),
        OutgoingControl::ResponseTranscript { text } => {
            Some(VoiceClientEvent::AssistantTranscript { text })
        }
        OutgoingControl::RecipeUpdate { recipe } => {
            if store.apply_if_newer(recipe.clone()) {
                Some(VoiceClientEvent::RecipeUpdated(recipe))
            } else {
                debug!("Discarding stale recipe update from voice channel");
                None
            }
        }
        OutgoingControl::Error { message } => Some(VoiceClientEvent::Error { message }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::{Ingredient, Step};

    fn snapshot(last_updated: u64) -> RecipeSnapshot {
        RecipeSnapshot {
            id: "r1".to_string(),
            title: "Toast".to_string(),
            servings: None,
            ingredients: vec![Ingredient {
                text: "bread".to_string(),
            }],
            steps: vec![Step {
                title: "Step 1".to_string(),
                description: "toast".to_string(),
            }],
            last_updated,
        }
    }

    #[test]
    fn test_recipe_update_applies_then_surfaces() {
        let store = RecipeStore::new();
        let event = control_to_event(
            OutgoingControl::RecipeUpdate {
                recipe: snapshot(10),
            },
            &store,
        );
        assert!(matches!(event, Some(VoiceClientEvent::RecipeUpdated(_))));
        assert_eq!(store.get("r1").expect("stored").last_updated, 10);
    }

    #[test]
    fn test_stale_recipe_update_is_discarded() {
        let store = RecipeStore::new();
        store.replace(snapshot(20));

        let event = control_to_event(
            OutgoingControl::RecipeUpdate {
                recipe: snapshot(10),
            },
            &store,
        );
        assert!(event.is_none());
        assert_eq!(store.get("r1").expect("stored").last_updated, 20);
    }

    #[test]
    fn test_capture_bridge_counts_dropped_frames() {
        let (frame_tx, mut frame_rx) = mpsc::channel::<AudioFrame>(1);
        let mut bridge = CaptureBridge::new(frame_tx);

        // Three full frames into a one-slot queue: two must drop
        let block = vec![0.5f32; FRAME_SAMPLES * 3];
        assert!(bridge.on_audio_block(&block));
        assert_eq!(bridge.dropped_frames(), 2);
        assert_eq!(
            frame_rx.try_recv().expect("one frame queued").samples(),
            FRAME_SAMPLES
        );
        assert!(frame_rx.try_recv().is_err());
    }

    #[test]
    fn test_capture_bridge_continues_without_full_frame() {
        let (frame_tx, _frame_rx) = mpsc::channel::<AudioFrame>(1);
        let mut bridge = CaptureBridge::new(frame_tx);
        assert!(bridge.on_audio_block(&[0.1f32; 128]));
        assert_eq!(bridge.dropped_frames(), 0);
    }
}
