//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a live screening
//! connection. The reviewer is shown one paper at a time, records decisions
//! and edits notes, which are autosaved in the background.

use crate::{
    error::{core_error_response, port_error_response, ApiError},
    web::{
        protocol::{ClientMessage, ServerMessage},
        rest::PaperResponse,
        state::{AppState, ScreeningSession},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use rapid_review_core::{ScreeningFlow, ScreeningState};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn send(sender: &mut WsSender, msg: &ServerMessage) -> Result<(), ApiError> {
    let json = serde_json::to_string(msg).map_err(|e| ApiError::Internal(e.to_string()))?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn send_error(sender: &mut WsSender, message: String) {
    if let Err(e) = send(sender, &ServerMessage::Error { message }).await {
        warn!("Failed to send error message: {:?}", e);
    }
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New screening connection for user: {}", user_id);
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let project_id = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(init_json.as_str()) {
                Ok(ClientMessage::Init { project_id }) => project_id,
                _ => {
                    error!("First message was not a valid Init message.");
                    send_error(&mut sender, "Expected an init message.".to_string()).await;
                    return;
                }
            }
        }
        _ => {
            info!("Client disconnected before sending Init message.");
            return;
        }
    };

    let (mut session, mut saved_rx) = ScreeningSession::new(&app_state, user_id, project_id);

    // The first load doubles as the membership check.
    match next_paper(&app_state, &mut session).await {
        Ok(first) => {
            if let Err(e) = send(&mut sender, &first).await {
                warn!("Failed to send first paper: {:?}", e);
                session.close().await;
                return;
            }
        }
        Err(message) => {
            error!("Failed to open screening for project {}: {}", project_id, message);
            send_error(&mut sender, message).await;
            session.close().await;
            return;
        }
    }
    info!(project_id = %project_id, "Screening session initialized");

    // --- 2. Main Message Loop ---
    let cancellation_token = session.cancellation_token.clone();
    'session: loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let replies = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(msg) => apply_message(&app_state, &mut session, msg).await,
                        Err(e) => {
                            warn!("Failed to deserialize client message: {}", e);
                            vec![ServerMessage::Error { message: format!("Unreadable message: {}", e) }]
                        }
                    };
                    for reply in &replies {
                        if let Err(e) = send(&mut sender, reply).await {
                            error!("Screening connection failed: {:?}", e);
                            break 'session;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {:?}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            Some(saved) = saved_rx.recv() => {
                let ack = ServerMessage::NoteSaved {
                    paper_id: saved.note.paper_id,
                    generation: saved.generation,
                };
                if send(&mut sender, &ack).await.is_err() {
                    break;
                }
            }
            _ = cancellation_token.cancelled() => {
                info!("Server shutting down; closing screening connection.");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    session.close().await;
    info!("Screening connection closed.");
}

//=========================================================================================
// Session Logic
//=========================================================================================

/// Loads the next unreviewed paper for the session. Core errors come back as
/// the message to show the client.
pub async fn next_paper(
    app_state: &AppState,
    session: &mut ScreeningSession,
) -> Result<ServerMessage, String> {
    let flow = ScreeningFlow::new(app_state.db.as_ref(), session.project_id, session.user_id);
    match flow.next().await {
        Ok(state) => Ok(present(app_state, session, state).await),
        Err(e) => {
            let (_, message) = core_error_response("load next paper", e);
            Err(message)
        }
    }
}

/// The presented paper, with any saved note, or `Exhausted`.
async fn present(
    app_state: &AppState,
    session: &mut ScreeningSession,
    state: ScreeningState,
) -> ServerMessage {
    match state {
        ScreeningState::Presenting(view) => {
            let paper_id = view.entry.paper.id;
            let note = match app_state
                .db
                .get_note(session.project_id, paper_id, session.user_id)
                .await
            {
                Ok(note) => note.map(|n| n.body),
                Err(e) => {
                    let (_, message) = port_error_response("load note", e);
                    warn!("{}", message);
                    None
                }
            };
            session.current_paper = Some(paper_id);
            ServerMessage::Paper {
                paper: PaperResponse::from(view),
                note,
            }
        }
        ScreeningState::Exhausted => {
            session.current_paper = None;
            ServerMessage::Exhausted
        }
    }
}

/// Applies one client message to the session and returns the replies, in order.
/// Note acknowledgements arrive later on the session's saved-note channel.
pub async fn apply_message(
    app_state: &AppState,
    session: &mut ScreeningSession,
    msg: ClientMessage,
) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Decide { paper_id, decision } => {
            let flow =
                ScreeningFlow::new(app_state.db.as_ref(), session.project_id, session.user_id);
            match flow.submit(paper_id, &decision).await {
                Ok(outcome) => {
                    let recorded = ServerMessage::ReviewRecorded {
                        review_id: outcome.review.id,
                        paper_id,
                        decision: outcome.review.decision.as_str().to_string(),
                        conflict_id: outcome.conflict.map(|c| c.id),
                    };
                    let next = present(app_state, session, outcome.next).await;
                    vec![recorded, next]
                }
                Err(e) => {
                    let (_, message) = core_error_response("submit review", e);
                    vec![ServerMessage::Error { message }]
                }
            }
        }
        ClientMessage::EditNote { paper_id, body } => {
            let generation = session.edit_note(app_state, paper_id, body).await;
            debug!(paper_id = %paper_id, generation, "Note edit queued");
            Vec::new()
        }
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
            Vec::new()
        }
    }
}
