//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-connection state of a
//! live screening session.

use crate::config::Config;
use rapid_review_core::autosave::{NoteAutosaver, NoteKey, SavedNote};
use rapid_review_core::ports::{
    CriteriaGenerationService, DatabaseService, RelevancyScoringService,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub criteria_adapter: Arc<dyn CriteriaGenerationService>,
    pub relevancy_adapter: Arc<dyn RelevancyScoringService>,
    /// Cancelled on shutdown; every screening session derives its token from it.
    pub shutdown: CancellationToken,
}

//=========================================================================================
// ScreeningSession (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active screening connection.
pub struct ScreeningSession {
    pub user_id: Uuid,
    pub project_id: Uuid,
    /// The paper currently presented, if any.
    pub current_paper: Option<Uuid>,
    /// Autosave task for the note on `current_paper`.
    pub autosaver: Option<NoteAutosaver>,
    /// Cancels the session's background work when the connection goes away.
    pub cancellation_token: CancellationToken,
    saved_tx: mpsc::UnboundedSender<SavedNote>,
}

impl ScreeningSession {
    pub fn new(
        app_state: &AppState,
        user_id: Uuid,
        project_id: Uuid,
    ) -> (Self, mpsc::UnboundedReceiver<SavedNote>) {
        let (saved_tx, saved_rx) = mpsc::unbounded_channel();
        let session = Self {
            user_id,
            project_id,
            current_paper: None,
            autosaver: None,
            cancellation_token: app_state.shutdown.child_token(),
            saved_tx,
        };
        (session, saved_rx)
    }

    /// Queues a note edit for `paper_id`, switching the autosaver over when the
    /// paper changed. The previous paper's pending text is flushed first.
    pub async fn edit_note(&mut self, app_state: &AppState, paper_id: Uuid, body: String) -> u64 {
        let saver = match self.autosaver.take() {
            Some(saver) if saver.key().paper_id == paper_id => saver,
            previous => {
                if let Some(previous) = previous {
                    previous.shutdown().await;
                }
                let key = NoteKey {
                    project_id: self.project_id,
                    paper_id,
                    user_id: self.user_id,
                };
                NoteAutosaver::spawn(
                    app_state.db.clone(),
                    key,
                    app_state.config.note_autosave,
                    self.cancellation_token.child_token(),
                    self.saved_tx.clone(),
                )
            }
        };

        let generation = saver.edit(body);
        self.autosaver = Some(saver);
        generation
    }

    /// Flushes any pending note once, then cancels the session's background work.
    pub async fn close(mut self) {
        if let Some(saver) = self.autosaver.take() {
            saver.shutdown().await;
        }
        self.cancellation_token.cancel();
    }
}
