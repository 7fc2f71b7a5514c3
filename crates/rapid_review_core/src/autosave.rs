//! crates/rapid_review_core/src/autosave.rs
//!
//! Debounced autosave for reviewer notes.
//!
//! Edits are sent to a background task which waits for a quiet period and
//! then saves only the latest text. Every edit bumps a generation counter; a
//! save acknowledgement is only reported if no newer edit arrived while the
//! save was in flight, so a stale save never overwrites fresher client state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ReviewerNote;
use crate::ports::DatabaseService;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(800);

/// Identifies the note being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteKey {
    pub project_id: Uuid,
    pub paper_id: Uuid,
    pub user_id: Uuid,
}

/// Reported after a save that still reflects the newest edit.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedNote {
    pub generation: u64,
    pub note: ReviewerNote,
}

struct Edit {
    generation: u64,
    body: String,
}

/// Handle to a running autosave task for a single note.
pub struct NoteAutosaver {
    key: NoteKey,
    edits: mpsc::UnboundedSender<Edit>,
    generation: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl NoteAutosaver {
    /// Starts the autosave task. Acknowledgements go to `saved`; cancelling
    /// `cancel` saves the latest unsaved edit once, without acknowledgement,
    /// and stops the task.
    pub fn spawn(
        db: Arc<dyn DatabaseService>,
        key: NoteKey,
        quiet_period: Duration,
        cancel: CancellationToken,
        saved: mpsc::UnboundedSender<SavedNote>,
    ) -> Self {
        let (edits, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(autosave_loop(
            db,
            key,
            quiet_period,
            cancel,
            rx,
            generation.clone(),
            saved,
        ));

        Self {
            key,
            edits,
            generation,
            task,
        }
    }

    pub fn key(&self) -> NoteKey {
        self.key
    }

    /// Queues the latest note text and returns its generation.
    pub fn edit(&self, body: impl Into<String>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .edits
            .send(Edit {
                generation,
                body: body.into(),
            })
            .is_err()
        {
            warn!(paper_id = %self.key.paper_id, "Autosave task already stopped; edit dropped");
        }
        generation
    }

    /// Saves any pending edit once, without acknowledgement, and stops the task.
    pub async fn shutdown(self) {
        let Self { edits, task, .. } = self;
        drop(edits);
        if let Err(e) = task.await {
            warn!("Autosave task ended abnormally: {:?}", e);
        }
    }
}

async fn autosave_loop(
    db: Arc<dyn DatabaseService>,
    key: NoteKey,
    quiet_period: Duration,
    cancel: CancellationToken,
    mut rx: mpsc::UnboundedReceiver<Edit>,
    generation: Arc<AtomicU64>,
    saved: mpsc::UnboundedSender<SavedNote>,
) {
    let mut pending: Option<Edit> = None;
    let timer = sleep(quiet_period);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(paper_id = %key.paper_id, "Autosave cancelled; flushing");
                rx.close();
                while let Ok(edit) = rx.try_recv() {
                    pending = Some(edit);
                }
                flush(db.as_ref(), key, pending.take()).await;
                return;
            }

            edit = rx.recv() => match edit {
                Some(edit) => {
                    pending = Some(edit);
                    timer.as_mut().reset(Instant::now() + quiet_period);
                }
                None => {
                    // Handle dropped: flush what is left, nobody is listening for acks.
                    flush(db.as_ref(), key, pending.take()).await;
                    return;
                }
            },

            _ = &mut timer, if pending.is_some() => {
                let Some(edit) = pending.take() else { continue };

                let result = db.save_note(key.project_id, key.paper_id, key.user_id, &edit.body).await;
                match result {
                    Ok(_) if cancel.is_cancelled() => {
                        debug!(generation = edit.generation, "Session cancelled; acknowledgement suppressed");
                    }
                    Ok(note) if generation.load(Ordering::SeqCst) == edit.generation => {
                        debug!(paper_id = %key.paper_id, generation = edit.generation, "Note saved");
                        let _ = saved.send(SavedNote { generation: edit.generation, note });
                    }
                    Ok(_) => {
                        debug!(generation = edit.generation, "Discarding stale note acknowledgement");
                    }
                    Err(e) => {
                        warn!("Failed to save note for paper {}: {:?}", key.paper_id, e);
                    }
                }
            }
        }
    }
}

/// Saves `pending` once without reporting it.
async fn flush(db: &dyn DatabaseService, key: NoteKey, pending: Option<Edit>) {
    let Some(edit) = pending else { return };
    if let Err(e) = db
        .save_note(key.project_id, key.paper_id, key.user_id, &edit.body)
        .await
    {
        warn!("Failed to flush note for paper {}: {:?}", key.paper_id, e);
    }
}
