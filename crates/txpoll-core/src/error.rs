use std::path::PathBuf;

use thiserror::Error;

use crate::transaction::ValidationFailure;

#[derive(Debug, Error)]
pub enum TxpollError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status endpoint returned HTTP {status}")]
    Http { status: u16 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TxpollError>;
