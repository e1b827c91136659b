use thiserror::Error;

use crate::pipeline::Phase;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Migration failed: {message}")]
    MigrationError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Extraction failed: {message}")]
    ExtractionError { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl From<std::io::Error> for WarehouseError {
    fn from(err: std::io::Error) -> Self {
        WarehouseError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<diesel::ConnectionError> for WarehouseError {
    fn from(err: diesel::ConnectionError) -> Self {
        WarehouseError::ConnectionError {
            message: err.to_string(),
        }
    }
}

/// Failure signal handed back to the orchestrator: which phase stopped the run and why.
#[derive(Error, Debug)]
#[error("phase `{phase}` failed: {source}")]
pub struct PhaseError {
    pub phase: Phase,
    #[source]
    pub source: WarehouseError,
}

impl PhaseError {
    pub fn new(phase: Phase, source: WarehouseError) -> Self {
        Self { phase, source }
    }
}
