//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for live abstract screening.

use crate::web::rest::PaperResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens screening for a project. This must be the first message sent on the connection.
    Init { project_id: Uuid },

    /// Records the reviewer's decision (`accept`, `reject` or `skip`) on a paper.
    Decide { paper_id: Uuid, decision: String },

    /// The latest full text of the reviewer's note on a paper. Saved after a quiet period.
    EditNote { paper_id: Uuid, body: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The next paper to screen, with the reviewer's saved note if there is one.
    Paper {
        paper: PaperResponse,
        note: Option<String>,
    },

    /// Confirms a decision was stored. `conflict_id` is set when reviewers disagree.
    ReviewRecorded {
        review_id: Uuid,
        paper_id: Uuid,
        decision: String,
        conflict_id: Option<Uuid>,
    },

    /// Confirms the note with this generation is saved. Older generations are never confirmed.
    NoteSaved { paper_id: Uuid, generation: u64 },

    /// Every paper in the project carries a decision from this reviewer.
    Exhausted,

    /// Reports an error to the client, which should display the message.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let id = Uuid::nil();
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "decide",
            "paper_id": id,
            "decision": "accept"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Decide {
                paper_id: id,
                decision: "accept".to_string()
            }
        );

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "edit_note",
            "paper_id": id,
            "body": "Population unclear"
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::EditNote { .. }));
    }

    #[test]
    fn init_carries_the_project_id() {
        let project_id = Uuid::from_u128(7);
        let msg: ClientMessage = serde_json::from_str(&format!(
            r#"{{"type":"init","project_id":"{}"}}"#,
            project_id
        ))
        .unwrap();
        assert_eq!(msg, ClientMessage::Init { project_id });
    }

    #[test]
    fn paper_message_carries_the_saved_note() {
        let paper = PaperResponse {
            id: Uuid::nil(),
            title: "Screens at night".to_string(),
            abstract_text: String::new(),
            authors: vec!["Ada".to_string()],
            publication_date: None,
            full_text_url: None,
            relevancy_score: Some(0.75),
            imported_at: chrono::Utc::now(),
            my_decision: None,
        };
        let value = serde_json::to_value(ServerMessage::Paper {
            paper,
            note: Some("check sample size".to_string()),
        })
        .unwrap();

        assert_eq!(value["type"], "paper");
        assert_eq!(value["note"], "check sample size");
        assert_eq!(value["paper"]["title"], "Screens at night");
        assert_eq!(value["paper"]["relevancy_score"], 0.75);
        assert_eq!(value["paper"]["my_decision"], serde_json::Value::Null);
    }

    #[test]
    fn unknown_client_messages_fail_to_parse() {
        let result = serde_json::from_value::<ClientMessage>(json!({ "type": "undo" }));
        assert!(result.is_err());
    }

    #[test]
    fn server_messages_serialize_with_snake_case_tags() {
        let value = serde_json::to_value(ServerMessage::NoteSaved {
            paper_id: Uuid::nil(),
            generation: 3,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "type": "note_saved", "paper_id": Uuid::nil(), "generation": 3 })
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Exhausted).unwrap(),
            json!({ "type": "exhausted" })
        );
    }
}
