// Error types for art-companion

use crate::session::Mode;
use thiserror::Error;

/// The single failure kind surfaced by any gateway operation.
///
/// Transport errors, safety rejections, timeouts and malformed payloads all
/// collapse into this; `cause` is a human-readable description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote failure: {cause}")]
pub struct RemoteFailure {
    cause: String,
}

impl RemoteFailure {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }
}

impl From<reqwest::Error> for RemoteFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteFailure::new(format!("request timed out: {}", err))
        } else {
            RemoteFailure::new(format!("transport error: {}", err))
        }
    }
}

impl From<base64::DecodeError> for RemoteFailure {
    fn from(err: base64::DecodeError) -> Self {
        RemoteFailure::new(format!("invalid base64 payload: {}", err))
    }
}

/// Reasons a user action is refused before it touches the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("another request is still in flight")]
    Busy,

    #[error("there is no image to edit yet")]
    NoImage,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("image payload is empty")]
    EmptyImage,

    #[error("unsupported image type: {0} (expected image/png or image/jpeg)")]
    UnsupportedMimeType(String),

    #[error("not available in {0:?} mode")]
    WrongMode(Mode),
}

/// Errors raised while assembling configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("no API key configured (set GEMINI_API_KEY or api_key in the config file)")]
    MissingApiKey,
}
