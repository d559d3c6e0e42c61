use thiserror::Error;

/// Errors from rate limiter backend operations.
///
/// None of these reach the enforcement caller: the gate degrades to a
/// permissive decision at its boundary. They exist so backends can report
/// what went wrong for logging and metrics.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
