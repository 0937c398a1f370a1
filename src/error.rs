// src/error.rs
use thiserror::Error;

/// Failures that mean the observation session itself is unusable and must be
/// replaced by the supervisor. Never returned for single-request problems.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport closed: {0}")]
    TransportClosed(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::TransportClosed(err.to_string())
    }
}

/// Per-item enrichment failures. `Blocked` triggers hybrid resolution
/// (persist from feed-row metadata); the rest are logged and the item is
/// skipped. None of these are fatal to the loop that hit them.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("blocked by anti-automation challenge")]
    Blocked,

    #[error("item not found")]
    NotFound,

    #[error("extraction failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Other(err.to_string())
    }
}

/// The backfill target's activity page could not be loaded at all. Terminal
/// for that invocation of the pipeline only.
#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("activity page for {identity} could not be loaded: {reason}")]
    Unavailable { identity: String, reason: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}
