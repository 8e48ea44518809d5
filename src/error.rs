use thiserror::Error;

/// Failures of the correlated message channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no reply to message {id} within {timeout_ms}ms")]
    Timeout { id: u64, timeout_ms: u64 },

    #[error("channel closed before a reply arrived")]
    Closed,

    #[error("transport disconnected")]
    Disconnected,

    #[error("failed to encode message: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlagError {
    #[error("flag still locked after {0}ms")]
    Timeout(u64),

    #[error("flag mutated while a mutation was already in progress")]
    ConcurrentMutation,
}

#[derive(Debug, Clone, Error)]
pub enum ReplicaError {
    #[error("failed to apply update: {0}")]
    Import(String),

    #[error("failed to encode update: {0}")]
    Export(String),

    #[error("invalid state vector: {0}")]
    Vector(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token validation failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("expected a '{expected}' token, got '{actual}'")]
    WrongTokenType { expected: String, actual: String },

    #[error("no JWT secret configured")]
    MissingSecret,

    #[error("{0}")]
    MissingToken(String),
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("document '{0}' does not exist")]
    UnknownDocument(String),

    #[error("room '{0}' is not open on this worker")]
    NotOpen(String),

    #[error("room '{0}' is closed")]
    Closed(String),

    #[error("room secret does not match for '{0}'")]
    SecretMismatch(String),

    #[error("store refused to save '{0}'")]
    SaveRejected(String),

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
