//! Per-connection conversation session and the process-wide registry.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::core::completion::{ChatTurn, HistoryWindow};
use crate::core::recipe::{RecipeDraft, RecipeSnapshot, RecipeStore, next_version};

/// Lifecycle of a voice session's bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// Socket accepted, nothing attached yet
    #[default]
    Init,
    /// Attempting the upstream attachment
    Connecting,
    /// Bound to the Live Session Service
    LiveActive,
    /// Bound to the Completion Service fallback
    DegradedActive,
    /// Tearing down
    Closing,
    /// Removed from the registry
    Closed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Init => write!(f, "init"),
            BridgeState::Connecting => write!(f, "connecting"),
            BridgeState::LiveActive => write!(f, "live_active"),
            BridgeState::DegradedActive => write!(f, "degraded_active"),
            BridgeState::Closing => write!(f, "closing"),
            BridgeState::Closed => write!(f, "closed"),
        }
    }
}

/// Server-side state for one voice WebSocket connection.
///
/// Owned exclusively by the connection task; nothing here is shared across
/// connections. History is a sliding window of the ten most recent turns and
/// dies with the connection unless handed to the fallback path.
#[derive(Debug)]
pub struct ConversationSession {
    pub id: Uuid,
    pub state: BridgeState,
    pub history: HistoryWindow,
    pub current_recipe: Option<RecipeSnapshot>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: BridgeState::Init,
            history: HistoryWindow::new(),
            current_recipe: None,
        }
    }

    /// Move to `next`, mirroring the transition into the registry handle.
    pub fn transition(&mut self, handle: &SessionHandle, next: BridgeState) {
        info!(session_id = %self.id, from = %self.state, to = %next, "Voice session state change");
        self.state = next;
        handle.set_state(next);
    }

    pub fn push_turn(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    /// Turn a validated `set_recipe` draft into the session's new snapshot.
    ///
    /// The stamp is strictly newer than both the session's own recipe and the
    /// store's document, so the relayed `recipe_update` always passes the
    /// receiver's version check. The store is written through with the same
    /// snapshot.
    pub fn apply_recipe(&mut self, draft: RecipeDraft, store: &RecipeStore) -> RecipeSnapshot {
        let id = self
            .current_recipe
            .as_ref()
            .map(|recipe| recipe.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let prev = self
            .current_recipe
            .as_ref()
            .map(|recipe| recipe.last_updated)
            .into_iter()
            .chain(store.get(&id).map(|doc| doc.last_updated))
            .max();

        let snapshot = draft.into_snapshot(id, next_version(prev));
        store.apply_if_newer(snapshot.clone());
        self.current_recipe = Some(snapshot.clone());
        snapshot
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry view of one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: Arc<RwLock<BridgeState>>,
    /// Fired to ask the connection task to shut down
    pub cancel: CancellationToken,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BridgeState::Init)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.read()
    }

    pub fn set_state(&self, state: BridgeState) {
        *self.state.write() = state;
    }
}

/// Process-wide map of live voice sessions.
///
/// Entries are inserted when a socket opens and removed when it closes or
/// fails; the registry never outlives its connections' tasks.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid) -> SessionHandle {
        let handle = SessionHandle::new();
        self.sessions.insert(id, handle.clone());
        handle
    }

    pub fn remove(&self, id: Uuid) {
        self.sessions.remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|handle| handle.value().clone())
    }

    /// Number of sessions currently open.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ask every live session to shut down.
    pub fn cancel_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().cancel.cancel();
        }
    }
}
