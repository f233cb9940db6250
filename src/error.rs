//! Error types for the conformance runner

use thiserror::Error;

/// Main error type for runner operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The program could not be started at all
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully
    #[error("{program} exited with code {code:?}: {stderr}")]
    CommandFailed {
        /// Program that failed
        program: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The program exceeded its deadline and was killed
    #[error("{program} timed out after {seconds}s")]
    Timeout {
        /// Program that timed out
        program: String,
        /// Deadline in seconds
        seconds: u64,
    },

    /// HTTP probe transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A lookup against the cluster returned nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Probe output did not satisfy its expectation
    #[error("check failed: {0}")]
    CheckFailed(String),

    /// One or more removals failed; every removal was still attempted
    #[error("cleanup incomplete: {0}")]
    Cleanup(String),

    /// Invalid runner configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A policy artifact could not be parsed
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Substrings that mark a kubectl failure as a connectivity hiccup rather
/// than a real rejection by the API server.
const TRANSIENT_MARKERS: &[&str] = &[
    "Unable to connect to the server",
    "connection refused",
    "connection reset",
    "i/o timeout",
    "TLS handshake timeout",
    "dial tcp",
    "EOF",
    "broken pipe",
    "transport is closing",
    "context deadline exceeded",
    "the object has been modified",
    "ServiceUnavailable",
    "client rate limiter",
    "couldn't get current server API group list",
];

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a manifest error with the given message
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Permanent failures (NotFound, Forbidden, invalid manifests) return
    /// false since retrying won't change the outcome.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::CommandFailed { stderr, .. } => {
                TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m))
            }
            Error::Timeout { .. } => true,
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
