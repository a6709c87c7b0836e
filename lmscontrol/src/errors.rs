use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
    #[error("No player is selected")]
    NoPlayerSelected,
    #[error("Drag Error: {0}")]
    Drag(String),
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("Transport Error: {0}")]
    Transport(String),
}

impl ControlError {
    pub fn drag(message: &str) -> Self {
        ControlError::Drag(message.to_string())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ControlError::Transport(message.into())
    }
}
