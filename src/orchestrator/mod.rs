pub mod fleet;
pub mod room_orchestrator;

pub use fleet::{spawn_workers, WorkerFleet};
pub use room_orchestrator::{Orchestrator, OrchestratorSettings};

use axum::Router;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::RoomAuth;
use crate::config::Config;
use crate::docs::ApiDoc;
use crate::routes::create_api_routes;

/// Shared state of the orchestrator's HTTP surface
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub auth: RoomAuth,
    pub room_token_ttl: Duration,
}

/// Combine API routes, Swagger UI and request tracing.
pub fn create_app(state: Arc<ApiState>) -> Router {
    Router::new()
        .nest("/api", create_api_routes(state))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Run the orchestrator: spawn the worker fleet and serve tickets until Ctrl-C.
pub async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let auth = RoomAuth::from_secret(config.cloud_auth_jwt_secret.as_deref())?;
    let orchestrator = Orchestrator::new(OrchestratorSettings::from_config(&config));
    let fleet = spawn_workers(&orchestrator, &config)?;

    let state = Arc::new(ApiState {
        orchestrator: orchestrator.clone(),
        auth,
        room_token_ttl: config.room_token_ttl(),
    });
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    info!("🚀 Server running on http://{}", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    orchestrator.mark_all_closed();
    fleet.shutdown().await;
    Ok(())
}
