use thiserror::Error;

/// Errors that can occur while assembling a [`Gate`](crate::Gate).
///
/// The enforcement path itself never returns these; a decision either
/// succeeds or surfaces [`weir_core::LimitExceeded`].
#[derive(Debug, Error)]
pub enum GateError {
    /// The gate was misconfigured (unreadable or unparsable config file).
    #[error("configuration error: {0}")]
    Configuration(String),
}
