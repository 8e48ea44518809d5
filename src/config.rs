use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Which half of the system this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Orchestrator,
    Worker,
}

impl Role {
    /// Whether a panic takes the whole process down.
    ///
    /// The orchestrator exits, which closes every worker's control stdin.
    /// A worker keeps running so one broken socket or room task does not
    /// lose the other rooms it hosts.
    pub fn exits_on_panic(self) -> bool {
        matches!(self, Role::Orchestrator)
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Process role
    #[serde(default)]
    pub role: Role,

    /// Bind address for the HTTP server and worker sockets
    #[serde(default = "default_host")]
    pub host: String,

    /// Orchestrator HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host name handed out to clients in room tickets
    #[serde(default = "default_public_host")]
    pub public_host: String,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Explicit number of document workers
    pub worker_count: Option<usize>,

    /// First worker port; worker i listens on base + i
    #[serde(default = "default_worker_base_port")]
    pub worker_base_port: u16,

    /// Set by the orchestrator on each spawned worker
    pub worker_id: Option<u32>,
    pub worker_port: Option<u16>,

    /// JWT secret key (user tokens and room tokens)
    pub cloud_auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,

    #[serde(default = "default_reclaim_debounce_ms")]
    pub reclaim_debounce_ms: u64,

    #[serde(default = "default_room_timeout_ms")]
    pub open_room_timeout_ms: u64,

    #[serde(default = "default_room_timeout_ms")]
    pub close_room_timeout_ms: u64,

    #[serde(default = "default_room_token_ttl_secs")]
    pub room_token_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }

    /// Number of workers to fork: explicit count, else 2 × CPUs in production and 2 otherwise.
    pub fn effective_worker_count(&self) -> usize {
        if let Some(count) = self.worker_count {
            return count.max(1);
        }
        if self.is_production() {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            2 * cpus
        } else {
            2
        }
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn reclaim_debounce(&self) -> Duration {
        Duration::from_millis(self.reclaim_debounce_ms)
    }

    pub fn open_room_timeout(&self) -> Duration {
        Duration::from_millis(self.open_room_timeout_ms)
    }

    pub fn close_room_timeout(&self) -> Duration {
        Duration::from_millis(self.close_room_timeout_ms)
    }

    pub fn room_token_ttl(&self) -> Duration {
        Duration::from_secs(self.room_token_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::default(),
            host: default_host(),
            port: default_port(),
            public_host: default_public_host(),
            environment: default_environment(),
            log_level: default_log_level(),
            worker_count: None,
            worker_base_port: default_worker_base_port(),
            worker_id: None,
            worker_port: None,
            cloud_auth_jwt_secret: None,
            db_url: None,
            save_debounce_ms: default_save_debounce_ms(),
            reclaim_debounce_ms: default_reclaim_debounce_ms(),
            open_room_timeout_ms: default_room_timeout_ms(),
            close_room_timeout_ms: default_room_timeout_ms(),
            room_token_ttl_secs: default_room_token_ttl_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_host() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_worker_base_port() -> u16 {
    4000
}

fn default_save_debounce_ms() -> u64 {
    30_000
}

fn default_reclaim_debounce_ms() -> u64 {
    10_000
}

fn default_room_timeout_ms() -> u64 {
    10_000
}

fn default_room_token_ttl_secs() -> u64 {
    24 * 60 * 60
}
