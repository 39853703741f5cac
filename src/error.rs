use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No feasible route: {0}")]
    NoFeasibleRoute(String),

    #[error("Model not ready: {0}")]
    ModelNotReady(String),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`AppError`] for callers that need to branch
/// on the failure without matching message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientData,
    NoFeasibleRoute,
    ModelNotReady,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::Config(_) => ErrorKind::Validation,
            AppError::InsufficientData(_) => ErrorKind::InsufficientData,
            AppError::NoFeasibleRoute(_) => ErrorKind::NoFeasibleRoute,
            AppError::ModelNotReady(_) => ErrorKind::ModelNotReady,
            AppError::Clustering(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status an API layer should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(ref e) | AppError::Config(ref e) => {
                tracing::debug!("Rejected input: {}", e);
                400
            }
            AppError::InsufficientData(ref e) => {
                tracing::info!("Insufficient data: {}", e);
                422
            }
            AppError::NoFeasibleRoute(ref e) => {
                tracing::info!("No feasible route: {}", e);
                404
            }
            AppError::ModelNotReady(ref e) => {
                tracing::warn!("Model not ready: {}", e);
                503
            }
            AppError::Clustering(ref e) => {
                tracing::error!("Clustering error: {}", e);
                500
            }
            AppError::Io(ref e) => {
                tracing::error!("I/O error: {}", e);
                500
            }
            AppError::Serialization(ref e) => {
                tracing::error!("Serialization error: {}", e);
                500
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                500
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
