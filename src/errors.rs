use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("STORAGE_FAILURE: {0}")]
    Storage(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("TRANSPORT_FAILURE: {0}")]
    Transport(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        // reqwest errors embed the request URL, which carries the bot token.
        Self::Transport(value.without_url().to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
