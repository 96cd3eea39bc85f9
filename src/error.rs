//! Error types for the dashboard server.

use thiserror::Error;

/// Errors that can occur while loading data or composing device images.
#[derive(Debug, Error)]
pub enum Error {
    /// Text could not be laid out in the requested box.
    ///
    /// Raised when a multi-word line still overflows after backing off a word,
    /// which means the box is narrower than the measurement allows.
    #[error("Layout error: {0}")]
    Layout(String),

    /// A value object was constructed with invalid fields
    #[error("Invalid {what}: {reason}")]
    Invalid {
        /// What was being constructed
        what: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Device is not in the registry
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Configuration file missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream collaborator (calendar, weather) failed
    #[error("Upstream request failed: {0}")]
    Request(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(String),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(String),
}

impl Error {
    pub(crate) fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            what,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::invalid("filter", err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[cfg(feature = "nws")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Request(err.to_string())
    }
}
