use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

pub type WorkerId = u32;

/// Where a room lives and how busy it is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlacement {
    pub doc_id: String,
    pub current_user_count: u32,
    pub updates_per_second: f64,
    pub worker_id: WorkerId,
    pub room_secret: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Created,
    Started,
    Closed,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Created => write!(f, "created"),
            WorkerStatus::Started => write!(f, "started"),
            WorkerStatus::Closed => write!(f, "closed"),
        }
    }
}

/// One spawned document worker, as tracked by the orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub host: String,
    pub port: u16,
    pub status: WorkerStatus,
    /// Opens currently in flight to this worker
    pub pending_users: u32,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            status: WorkerStatus::Created,
            pending_users: 0,
        }
    }
}

/// What a caller needs to reach an open room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomTicket {
    pub host: String,
    pub port: u16,
    pub doc_id: String,
    pub room_secret: String,
}
