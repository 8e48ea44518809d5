use serde::{Deserialize, Serialize};
use serde_with::{serde_as, base64::Base64};

use crate::models::DocumentMetadata;

/// Origin tag on updates pushed during the synchronization handshake.
pub const SYNC_ORIGIN: &str = "sync";

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocMessage {
    #[serde_as(as = "Base64")]
    pub blob: Vec<u8>,
    pub commit_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncVectorMessage {
    #[serde_as(as = "Base64")]
    pub vector: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMessage {
    pub index: u32,
    pub length: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerCursorMessage {
    pub session_id: String,
    pub user_id: String,
    pub index: u32,
    pub length: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocInfoMessage {
    pub metadata: DocumentMetadata,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub user_id: String,
    pub session_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserListMessage {
    pub users: Vec<RoomUser>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PingMessage {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// Messages a client sends to its worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "updateDoc")]
    UpdateDoc(UpdateDocMessage),
    #[serde(rename = "syncVector")]
    SyncVector(SyncVectorMessage),
    #[serde(rename = "updateCursor")]
    UpdateCursor(CursorMessage),
    #[serde(rename = "ping")]
    Ping(PingMessage),
}

/// Messages a worker sends to its clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "updateDoc")]
    UpdateDoc(UpdateDocMessage),
    #[serde(rename = "docInfo")]
    DocInfo(DocInfoMessage),
    #[serde(rename = "userList")]
    UserList(UserListMessage),
    #[serde(rename = "syncVector")]
    SyncVector(SyncVectorMessage),
    #[serde(rename = "updateCursor")]
    UpdateCursor(PeerCursorMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}
