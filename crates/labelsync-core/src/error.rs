//! Error types for labelsync-core

use thiserror::Error;

/// Result type alias using labelsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in labelsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Network or remote service failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the template service
    #[error("Template service error: {message} ({status})")]
    Api { status: u16, message: String },

    /// Requested version does not exist for the template
    #[error("Version not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session was stopped before or during the operation
    #[error("Sync session is closed")]
    SessionClosed,
}

impl Error {
    /// Whether the failure came from the network or the remote service.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http(_) | Self::Api { .. })
    }

    /// Short message suitable for `SyncState::sync_error`.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) | Self::Http(_) => {
                "Could not reach the template service. Check your connection and try again."
                    .to_string()
            }
            Self::Api { message, .. } => {
                format!("The template service rejected the request: {message}")
            }
            Self::NotFound(what) => format!("{what} no longer exists."),
            other => other.to_string(),
        }
    }
}
