use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::WorkerRecord;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub workers: Vec<WorkerRecord>,
    pub n_rooms: u32,
    pub n_idle_rooms: u32,
    pub n_users: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
