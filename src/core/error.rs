//! Error types for dispatching and the LLM service layer.

use std::time::Duration;

/// Failure of a single transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Errors reported to the caller of [`Dispatcher::submit`](crate::core::dispatcher::Dispatcher::submit)
/// or through its pending result.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("dispatcher is closed")]
    Closed,

    /// The task was discarded without ever reaching the transport.
    #[error("task dropped before completion")]
    Dropped,
}

/// Errors of the typed LLM service built on top of the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum LlmServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to encode request: {0}")]
    Encode(serde_json::Error),

    #[error("unexpected backend response: {0}")]
    Decode(serde_json::Error),

    #[error("no reply from backend within {0:?}")]
    Timeout(Duration),
}
