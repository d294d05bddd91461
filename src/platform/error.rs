//! Error types shared by the library and the CLI.

use thiserror::Error;

pub type CallgenResult<T> = Result<T, CallgenError>;

#[derive(Debug, Error)]
pub enum CallgenError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("program error: {0}")]
    Program(String),
}
