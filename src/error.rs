use thiserror::Error;

/// The four error kinds from the design: validation, domain, numerical, cancellation.
#[derive(Debug, Error)]
pub enum MonteCarloError {
    #[error("validation failed: {field} — {reason}")]
    Validation { field: String, reason: String },

    #[error("domain rule violated: {reason}")]
    Domain { reason: String },

    #[error("numerical failure in {operation}: {reason}")]
    Numerical { operation: String, reason: String },

    #[error("cancelled after iteration {last_completed_iteration}")]
    Cancelled { last_completed_iteration: u64 },
}

impl MonteCarloError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        MonteCarloError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn domain(reason: impl Into<String>) -> Self {
        MonteCarloError::Domain {
            reason: reason.into(),
        }
    }

    pub fn numerical(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        MonteCarloError::Numerical {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MonteCarloError::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, MonteCarloError>;
