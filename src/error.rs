use thiserror::Error;

/// Failures surfaced by the monitoring core. None of them is fatal to the
/// ingestion loop; callers log and move on to the next event.
#[derive(Error, Debug)]
pub enum Error {
    #[error("code: validation_error, description: {0}")]
    Validation(String),

    #[error("code: external_write_failure, operation: {operation}, description: {source}")]
    ExternalWrite {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("code: timeout, operation: {operation}")]
    Timeout { operation: &'static str },

    #[error("code: inconsistent_registry, description: {0}")]
    InconsistentRegistry(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ExternalWrite { .. } => "external_write_failure",
            Self::Timeout { .. } => "timeout",
            Self::InconsistentRegistry(_) => "inconsistent_registry",
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn external_write_keeps_operation_and_cause() {
        let err = Error::ExternalWrite {
            operation: "mark_completed",
            source: anyhow!("connection reset"),
        };
        assert_eq!(err.code(), "external_write_failure");
        assert_eq!(
            err.to_string(),
            "code: external_write_failure, operation: mark_completed, description: connection reset"
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::Validation("x".into()).code(), "validation_error");
        assert_eq!(Error::Timeout { operation: "append" }.code(), "timeout");
        assert_eq!(Error::InconsistentRegistry("x".into()).code(), "inconsistent_registry");
    }
}
