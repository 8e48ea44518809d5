use std::error::Error;
use tracing::{info, warn};

use crate::auth::RoomAuth;
use crate::config::{Config, ConfigError};
use crate::db;
use crate::ipc::{line_channel, pump_lines};
use crate::models::{ControlMessage, WorkerStarted};
use crate::worker::{create_worker_routes, serve_control, DocumentWorker, WorkerSettings};

/// Run a document worker process.
///
/// Control traffic arrives on stdin and leaves on stdout; end of stdin means
/// the orchestrator is gone, so every room is saved and the worker exits.
pub async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let worker_id = config.worker_id.ok_or(ConfigError::Missing("WORKER_ID"))?;
    let port = config.worker_port.ok_or(ConfigError::Missing("WORKER_PORT"))?;
    let auth = RoomAuth::from_secret(config.cloud_auth_jwt_secret.as_deref())?;
    let store = db::connect_store(config.db_url.as_deref()).await?;

    let control = line_channel::<ControlMessage, _>(tokio::io::stdout());
    let requests = control.subscribe();
    let worker = DocumentWorker::new(
        WorkerSettings {
            worker_id,
            save_debounce: config.save_debounce(),
        },
        store,
        auth,
        control.clone(),
    );

    let address = format!("{}:{}", config.host, port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let app = create_worker_routes(worker.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });
    info!("📡 Worker {} accepting room sockets on ws://{}", worker_id, address);

    tokio::spawn(serve_control(worker.clone(), requests));
    control.notify(ControlMessage::WorkerStarted(WorkerStarted {}))?;

    pump_lines(tokio::io::stdin(), &control).await?;

    warn!("Control pipe closed, shutting down worker {}", worker_id);
    worker.close_all_rooms().await;
    control.destroy();
    server.abort();
    Ok(())
}
