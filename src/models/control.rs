use serde::{Deserialize, Serialize};

use crate::models::RoomPlacement;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoomRequest {
    pub doc_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoomReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<RoomPlacement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseRoomRequest {
    pub doc_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseRoomReply {
    pub success: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkerStarted {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatusUpdate {
    pub placement: RoomPlacement,
}

/// Orchestrator ↔ worker control protocol.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "openRoomRequest")]
    OpenRoomRequest(OpenRoomRequest),
    #[serde(rename = "openRoomReply")]
    OpenRoomReply(OpenRoomReply),
    #[serde(rename = "closeRoomRequest")]
    CloseRoomRequest(CloseRoomRequest),
    #[serde(rename = "closeRoomReply")]
    CloseRoomReply(CloseRoomReply),
    #[serde(rename = "workerStarted")]
    WorkerStarted(WorkerStarted),
    #[serde(rename = "roomStatusUpdate")]
    RoomStatusUpdate(RoomStatusUpdate),
}
