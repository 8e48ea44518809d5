use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{RoomUser, ServerMessage};

/// What the socket writer task should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Close the socket; nothing follows.
    Close,
}

/// One live client socket inside a room.
#[derive(Debug, Clone)]
pub struct Connector {
    pub session_id: Uuid,
    pub user_id: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connector {
    pub fn new(user_id: impl Into<String>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            tx,
        }
    }

    /// Queue a message; false once the socket side has gone away.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(Outbound::Message(message)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn user(&self) -> RoomUser {
        RoomUser {
            user_id: self.user_id.clone(),
            session_id: self.session_id.to_string(),
        }
    }
}
