//! Best-effort operation outcomes
//!
//! Store failures on the history and cache paths must never fail the caller's
//! request. Instead of swallowing them inside the services, those paths return a
//! [`Recoverable`] and the call site decides what to do with the error.

use tracing::warn;

use super::DomainError;

/// Outcome of a best-effort operation
#[derive(Debug)]
#[must_use = "a recovered error should be logged or inspected"]
pub enum Recoverable<T> {
    /// The operation reached the store and finished
    Complete(T),
    /// The operation failed in a way the caller may continue past
    Recovered(DomainError),
}

impl<T> Recoverable<T> {
    pub fn from_result(result: Result<T, DomainError>) -> Self {
        match result {
            Ok(value) => Self::Complete(value),
            Err(error) => Self::Recovered(error),
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }

    pub fn error(&self) -> Option<&DomainError> {
        match self {
            Self::Complete(_) => None,
            Self::Recovered(error) => Some(error),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Complete(value) => Some(value),
            Self::Recovered(_) => None,
        }
    }

    /// Log a recovered error at warn level and keep going
    pub fn log_and_continue(self, operation: &str) -> Option<T> {
        match self {
            Self::Complete(value) => Some(value),
            Self::Recovered(error) => {
                warn!(
                    operation,
                    transient = error.is_transient(),
                    error = %error,
                    "Recovered from store failure"
                );
                None
            }
        }
    }

    pub fn unwrap_or_default_logged(self, operation: &str) -> T
    where
        T: Default,
    {
        self.log_and_continue(operation).unwrap_or_default()
    }
}

impl<T> From<Result<T, DomainError>> for Recoverable<T> {
    fn from(result: Result<T, DomainError>) -> Self {
        Self::from_result(result)
    }
}
