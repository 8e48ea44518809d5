use crate::{models::DiagnosticsResponse, orchestrator::ApiState};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Fleet and host diagnostics
pub async fn diagnostics(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<DiagnosticsResponse>) {
    let workers = state.orchestrator.workers();
    let placements = state.orchestrator.placements();
    let n_rooms = placements.len() as u32;
    let n_idle_rooms = state.orchestrator.idle_rooms().len() as u32;
    let n_users: u32 = placements.iter().map(|p| p.current_user_count).sum();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Workers: {}, Rooms: {} ({} idle), Users: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        workers.len(),
        n_rooms,
        n_idle_rooms,
        n_users
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            workers,
            n_rooms,
            n_idle_rooms,
            n_users,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
