//! Error types and classification for the trading core.
//!
//! All failures at the gateway boundary are expressed as [`GatewayError`] and
//! funneled into either the response envelope (synchronous calls) or the
//! error stream (background loops). Nothing unwinds past the scheduler.

use std::time::Duration;

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classification of error types for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient errors that may resolve on retry (network issues, timeouts)
    Transient,
    /// Permanent errors that won't resolve on retry (invalid input, not found)
    Permanent,
    /// Configuration errors (missing config, invalid settings)
    Configuration,
    /// Internal errors (bugs, unexpected state)
    Internal,
}

/// Trait for errors that can classify themselves for retry logic.
pub trait ErrorClassification {
    /// Returns the category of this error
    fn category(&self) -> ErrorCategory;

    /// Returns true if this error is transient and may succeed on retry
    fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    /// Returns true if this error is permanent and won't succeed on retry
    fn is_permanent(&self) -> bool {
        matches!(self.category(), ErrorCategory::Permanent)
    }

    /// Suggests a delay before retrying, if applicable
    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self.category() {
            ErrorCategory::Transient => Some(Duration::from_millis(100)),
            _ => None,
        }
    }
}

/// Errors that can occur in the trading core or at an adapter boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    /// Order failed admission (missing instrument, bad volume/price).
    /// Reported per-order; never fatal.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport lost or refused. The adapter transitions to disconnected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed tick or wire message. The offending item is dropped and
    /// processing continues.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported query on a specific adapter.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Internal bug (e.g. active order without instrument). Fatal within the
    /// current session; aborts the scheduler.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Instrument subscription failed or was refused.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl ErrorClassification for GatewayError {
    fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Validation(_) => ErrorCategory::Permanent,
            GatewayError::Connection(_) => ErrorCategory::Transient,
            GatewayError::Parse(_) => ErrorCategory::Permanent,
            GatewayError::NotImplemented(_) => ErrorCategory::Permanent,
            GatewayError::Invariant(_) => ErrorCategory::Internal,
            GatewayError::Subscription(_) => ErrorCategory::Transient,
            GatewayError::Configuration(_) => ErrorCategory::Configuration,
            GatewayError::Timeout(_) => ErrorCategory::Transient,
        }
    }

    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            GatewayError::Connection(_) => Some(Duration::from_secs(1)),
            GatewayError::Subscription(_) => Some(Duration::from_millis(500)),
            GatewayError::Timeout(_) => Some(Duration::from_millis(500)),
            _ => None,
        }
    }
}

impl GatewayError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a not-implemented error for the named query.
    pub fn not_implemented(query: impl Into<String>) -> Self {
        Self::NotImplemented(query.into())
    }

    /// Returns true if this error must abort the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Invariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = GatewayError::connection("refused");
        assert!(err.is_transient());
        assert!(!err.is_permanent());
        assert!(err.suggested_retry_delay().is_some());

        let err = GatewayError::validation("volume must be positive");
        assert!(err.is_permanent());
        assert!(err.suggested_retry_delay().is_none());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invariant_is_fatal() {
        let err = GatewayError::Invariant("active order without instrument".into());
        assert!(err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert!(!err.is_transient());
    }
}
