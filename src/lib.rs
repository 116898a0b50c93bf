pub mod api;
pub mod audio;
pub mod chat;
pub mod history;
pub mod integration;
pub mod messages;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AyurError {
    /// Rejected locally before any request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// The service rejected the credentials or the token
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Any other non-2xx response or transport failure
    #[error("Service error: {message}")]
    Service { status: Option<u16>, message: String },

    /// The user declined a destructive action
    #[error("Confirmation declined")]
    ConfirmationDeclined,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<std::io::Error> for AyurError {
    fn from(e: std::io::Error) -> Self {
        AyurError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AyurError {
    fn from(e: serde_json::Error) -> Self {
        AyurError::Decode(e.to_string())
    }
}

impl AyurError {
    pub fn service(message: impl Into<String>) -> Self {
        AyurError::Service {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the error means the session is no longer valid
    pub fn is_auth(&self) -> bool {
        matches!(self, AyurError::Auth(_))
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The user fixes the input and retries
            AyurError::Validation(_) => true,
            // Requires signing in again
            AyurError::Auth(_) => false,
            // Transient, the user may resend
            AyurError::Timeout(_) => true,
            AyurError::Service { .. } => true,
            AyurError::ConfirmationDeclined => true,
            AyurError::Storage(_) => false,
            AyurError::Config(_) => false,
            AyurError::AudioDevice(_) => false,
            AyurError::Decode(_) => true,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            AyurError::Validation(reason) => reason.clone(),
            AyurError::Auth(reason) => reason.clone(),
            AyurError::Timeout(_) => {
                "The request took too long. Please try again.".to_string()
            }
            AyurError::Service { message, .. } => message.clone(),
            AyurError::ConfirmationDeclined => "Action cancelled.".to_string(),
            AyurError::Storage(_) => "Could not access saved credentials.".to_string(),
            AyurError::Config(_) => "Configuration error. Please check settings.".to_string(),
            AyurError::AudioDevice(_) => {
                "Audio device error. Please check your speakers.".to_string()
            }
            AyurError::Decode(_) => "Received an unreadable response.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AyurError>;
