use colabri_rooms::config::{Config, Role};
use colabri_rooms::{orchestrator, worker};
use std::panic;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        // A worker must never fall back to the orchestrator role and fork again
        if std::env::var("ROLE").is_ok_and(|role| role == "worker") {
            eprintln!("Worker failed to load configuration: {}", e);
            std::process::exit(1);
        }
        eprintln!("Failed to load configuration: {}, using defaults", e);
        Config::default()
    });

    let role = config.role;
    panic::set_hook(Box::new(move |info| {
        eprintln!("PANIC: {info}");
        if role.exits_on_panic() {
            std::process::exit(1);
        }
    }));

    // Initialize tracing; stdout is the control pipe for workers, so log to stderr
    let default_filter = format!("colabri_rooms=debug,tower_http=debug,{}", config.log_level);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    if config.cloud_auth_jwt_secret.is_none() {
        warn!("CLOUD_AUTH_JWT_SECRET is not set");
    }

    let result = match config.role {
        Role::Orchestrator => {
            info!("Starting orchestrator in {} mode...", config.environment);
            orchestrator::run(config).await
        }
        Role::Worker => {
            info!("Starting worker {:?}...", config.worker_id);
            worker::process::run(config).await
        }
    };

    if let Err(e) = result {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
