use serde::{Deserialize, Serialize};

use super::participant::{Gender, Seeking};
use super::room::{Role, RoomId};

/// Events a participant sends over the socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    SetProfile {
        gender: Gender,
        seeking: Seeking,
    },
    ConnectRequest,
    Next,
    Block,
    Typing {
        is_typing: bool,
    },
    Message {
        text: String,
    },
    Report {
        #[serde(default)]
        reason: String,
        #[serde(default)]
        block_next: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Searching,
    Connected,
    Disconnected,
}

/// Events pushed to a participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Status {
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomId>,
    },
    System {
        text: String,
    },
    Message {
        from: Role,
        text: String,
        ts: i64,
    },
    Typing {
        is_typing: bool,
    },
    Online {
        count: usize,
    },
}

impl ServerEvent {
    pub fn status(status: Status) -> Self {
        ServerEvent::Status { status, room: None }
    }

    pub fn system(text: impl Into<String>) -> Self {
        ServerEvent::System { text: text.into() }
    }
}
