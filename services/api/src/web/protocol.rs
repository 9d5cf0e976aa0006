//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket messages the server pushes to an instructor view that
//! follows a live session. The client sends nothing but close frames.

use attendance_core::{FinalizationResult, PresenceSnapshot};
use serde::Serialize;
use uuid::Uuid;

/// A student in the live present list.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PresentStudent {
    pub student_id: String,
    pub display_name: String,
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full present list, sent on connect and after every check-in.
    Presence {
        session_id: Uuid,
        count: usize,
        present: Vec<PresentStudent>,
    },

    /// Sent once per second while the session accepts check-ins.
    Countdown { session_id: Uuid, remaining_secs: i64 },

    /// The session left the active state. The connection closes after this.
    Ended {
        session_id: Uuid,
        status: String,
        present_count: Option<usize>,
        absent_count: Option<usize>,
    },

    /// Reports a fatal error to the client, which should display an error message.
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn presence(snapshot: PresenceSnapshot) -> Self {
        ServerMessage::Presence {
            session_id: snapshot.session_id,
            count: snapshot.count(),
            present: snapshot
                .present
                .into_iter()
                .map(|s| PresentStudent {
                    student_id: s.student_id,
                    display_name: s.display_name,
                })
                .collect(),
        }
    }

    pub fn ended(session_id: Uuid, status: String, outcome: Option<FinalizationResult>) -> Self {
        ServerMessage::Ended {
            session_id,
            status,
            present_count: outcome.map(|o| o.present_count),
            absent_count: outcome.map(|o| o.absent_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_tagged_by_type() {
        let json = serde_json::to_value(ServerMessage::Countdown {
            session_id: Uuid::nil(),
            remaining_secs: 12,
        })
        .unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["remaining_secs"], 12);

        let ended = serde_json::to_value(ServerMessage::ended(
            Uuid::nil(),
            "cancelled".into(),
            None,
        ))
        .unwrap();
        assert_eq!(ended["type"], "ended");
        assert!(ended["absent_count"].is_null());
    }
}
