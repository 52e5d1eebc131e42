//! Error types for Flywheel.
//!
//! The taxonomy mirrors the failure scopes of the engine: spec and
//! substitution errors are fatal for a whole run, sandbox errors are
//! scoped to the leg that hit them, and publish errors are reported
//! without reclassifying the build steps that already succeeded.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Definition errors (caught before any execution)
    #[error("Invalid pipeline spec: {0}")]
    Spec(String),

    // Substitution errors (caught before any sandbox is started)
    #[error("Unresolved reference ${{{name}}} in {location}")]
    Substitution { name: String, location: String },

    // Secret errors
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    // Sandbox errors (image pull/start failure, wait failure)
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    // Publish errors (sink unreachable or rejected)
    #[error("Publish failed: {0}")]
    Publish(String),

    // Infrastructure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error poisons the whole run rather than a single leg.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Spec(_) | Error::Substitution { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
