use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Everything a client needs to join a room on its worker.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomTicketResponse {
    pub host: String,
    pub port: u16,
    pub doc_id: String,
    pub room_secret: String,
    pub room_token: String,
    pub url: String,
}
