//! Error types for image generation.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Coarse classification of [`ImagegenError`], used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or unusable configuration.
    Configuration,
    /// Bad argument or argument combination.
    Validation,
    /// Input path unreadable or not a decodable image.
    FileAccess,
    /// A session operation needed a current image and there was none.
    NoImage,
    /// Opaque failure reported by (or while talking to) the image service.
    Service,
}

/// Errors that can occur while generating, editing or composing images.
#[derive(Debug, thiserror::Error)]
pub enum ImagegenError {
    /// Configuration problem, e.g. no API key in the environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Input image could not be read or decoded.
    #[error("cannot use image {}: {reason}", .path.display())]
    FileAccess { path: PathBuf, reason: String },

    /// No current image in the session.
    #[error("no image to save")]
    NoImage,

    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit or quota exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Response was well-formed but not what we expected.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (e.g., writing the output file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImagegenError {
    /// Builds a [`ImagegenError::FileAccess`] for `path`.
    pub fn file_access(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::FileAccess {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::FileAccess { .. } | Self::Io(_) => ErrorKind::FileAccess,
            Self::NoImage => ErrorKind::NoImage,
            Self::Auth(_)
            | Self::Api { .. }
            | Self::RateLimited { .. }
            | Self::ContentBlocked(_)
            | Self::Network(_)
            | Self::Decode(_)
            | Self::UnexpectedResponse(_)
            | Self::Json(_) => ErrorKind::Service,
        }
    }
}

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, ImagegenError>;

/// Maximum length of an API error message carried in an error.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Cleans up an API error body before it ends up in a user-facing message.
///
/// Collapses whitespace, redacts anything that looks like a Google API key
/// and truncates long bodies.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let redacted = collapsed
        .split(' ')
        .map(|word| {
            if let Some(pos) = word.find("AIza") {
                format!("{}[REDACTED]", &word[..pos])
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if redacted.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = redacted.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        redacted
    }
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
