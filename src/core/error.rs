// Centralized error handling for keyhub

use crate::stores::record_store::StoreStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a backing file at startup
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record in {}: {reason}", .path.display())]
    Schema { path: PathBuf, reason: String },
}

/// Errors raised while mirroring a collection to disk
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to serialize collection: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Write did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record store is not ready (status: {0})")]
    NotReady(StoreStatus),

    #[error("Record store failed to load: {0}")]
    LoadFailed(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Why a broadcast could not reach a subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Subscriber connection is closed")]
    Closed,

    #[error("Subscriber queue is full")]
    QueueFull,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SshKeyError {
    #[error("Public key is empty")]
    Empty,

    #[error("Public key is missing its key material")]
    MissingKeyData,

    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key material is not valid base64")]
    InvalidEncoding,

    #[error("Key material is truncated")]
    Truncated,

    #[error("Key material declares '{embedded}' but the line declares '{declared}'")]
    AlgorithmMismatch { declared: String, embedded: String },
}

/// Errors from key directory operations built on the record store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("User {0} not found")]
    UserNotFound(u32),

    #[error("Server {0} not found")]
    ServerNotFound(u32),

    #[error("Invalid SSH key: {0}")]
    InvalidSshKey(#[from] SshKeyError),

    #[error("Key {0} is already registered for this user")]
    DuplicateKey(String),

    #[error("Key {0} not found")]
    KeyNotFound(String),

    #[error("User {user_id} is not a member of server {server_id}")]
    NotAMember { server_id: u32, user_id: u32 },

    #[error("Unknown user ids: {0:?}")]
    UnknownUsers(Vec<u32>),

    #[error("Name must not be empty")]
    EmptyName,

    #[error("No fields to update")]
    NothingToUpdate,

    #[error("Hostname must not be empty")]
    EmptyHostname,

    #[error("{field} must be a finite number")]
    InvalidGauge { field: &'static str },
}

/// HTTP-facing errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidRecord(_) => ApiError::InvalidParameter(err.to_string()),
            StoreError::NotReady(_) | StoreError::LoadFailed(_) => {
                ApiError::Unavailable(err.to_string())
            }
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        let message = err.to_string();
        match err {
            DirectoryError::Store(store) => store.into(),
            DirectoryError::UserNotFound(_)
            | DirectoryError::ServerNotFound(_)
            | DirectoryError::KeyNotFound(_) => ApiError::NotFound(message),
            DirectoryError::DuplicateKey(_) => ApiError::Conflict(message),
            DirectoryError::InvalidSshKey(_)
            | DirectoryError::NotAMember { .. }
            | DirectoryError::UnknownUsers(_)
            | DirectoryError::EmptyName
            | DirectoryError::NothingToUpdate
            | DirectoryError::EmptyHostname
            | DirectoryError::InvalidGauge { .. } => ApiError::InvalidParameter(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use crate::models::admin::ErrorResponse;
        use axum::response::Json;

        let status = match &self {
            ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
