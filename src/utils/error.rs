use thiserror::Error;

/// Errors raised while driving a remote browser session.
///
/// `Transport` means the browser itself is gone or unreachable; the driver
/// pool treats it as grounds for silent session recreation. Everything else
/// is scoped to the operation that failed.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Browser transport error: {0}")]
    Transport(String),

    #[error("Timed out waiting for: {0}")]
    Timeout(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

impl SessionError {
    /// True when the underlying browser session is likely dead and should
    /// be recreated rather than retried.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown or disabled country: {code}")]
    CountryUnavailable { code: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
