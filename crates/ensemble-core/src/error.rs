use thiserror::Error;

/// A convenience `Result` alias using [`EnsembleError`].
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Top-level error type for the Ensemble crates.
///
/// Synchronous entry points (registration, submission, collaboration
/// creation, completion reports) return these directly. Background loops
/// log them and keep going.
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// The task queue stayed full for the whole submit timeout.
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// An unknown agent, task or collaboration id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Too few eligible agents to form a collaboration.
    #[error("Insufficient resources: {0}")]
    InsufficientResources(String),

    /// A message-bus publish or subscribe failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A collaboration strategy name that is not one of the known kinds.
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Input rejected at the boundary (bad tag, bad priority, illegal transition).
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    /// Shorthand for a [`EnsembleError::NotFound`] on an entity kind and id.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_helper() {
        let err = EnsembleError::not_found("agent", "abc");
        assert_eq!(err.to_string(), "Not found: agent abc");
    }

    #[test]
    fn test_json_conversion() {
        let err: EnsembleError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, EnsembleError::Json(_)));
    }
}
