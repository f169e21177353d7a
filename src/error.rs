use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the engine, the worker and the client handle.
#[derive(Debug, Error)]
pub enum SimError {
    /// A command that needs a world arrived before `init` completed.
    #[error("engine not initialized")]
    NotInitialized,
    /// Malformed or unknown message shape.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// No response arrived within the client-side window.
    #[error("request {request_id} timed out after {waited:?}")]
    AsyncTimeout { request_id: u64, waited: Duration },
    /// The worker thread is gone; the request can never be answered.
    #[error("engine worker terminated")]
    EngineTerminated,
    /// Configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("worker error: {0}")]
    Worker(String),
}

pub type SimResult<T> = Result<T, SimError>;
