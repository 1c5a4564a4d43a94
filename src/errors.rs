// Error taxonomy for parameter discovery.
//
// Transport failures are recoverable (a trial is skipped), validation
// failures surface before a run starts, and only a baseline-capture
// failure aborts a whole run.

use thiserror::Error;

/// Failure of a single outbound probe.
///
/// Callers treat this as "no signal" for the trial, never as fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid target url: {0}")]
    Url(String),

    #[error("payload key `{0}` cannot be used as a header name")]
    InvalidHeaderKey(String),
}

/// Malformed `DiscoveryRequest`, rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("url must be absolute http or https: `{0}`")]
    InvalidUrl(String),

    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("timeout_seconds must be between {min} and {max}, got {got}")]
    TimeoutOutOfRange { min: u64, max: u64, got: u64 },

    #[error("auth value is required for auth type `{0}`")]
    MissingAuthValue(String),
}

/// Top-level discovery failure.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("baseline capture failed: {0}")]
    FatalBaseline(String),
}
