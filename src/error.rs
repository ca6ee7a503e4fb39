//! Cache error types
//!
//! Backend adapters return these; the shared tier adapter absorbs them at its
//! boundary so they never escape `CacheCoordinator::get/set/delete`.

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Failed to connect to the shared tier backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize a cache value
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Shared tier operation exceeded its deadline
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),

    /// A registered warmer failed to produce a fresh value
    #[error("Cache warming error: {0}")]
    WarmingError(String),
}

impl CacheError {
    /// Whether this error came from talking to the shared tier backend
    ///
    /// Only these count as shared tier failures and trip the circuit
    /// breaker.
    pub fn is_backend_io(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::Timeout(_) | Self::BackendError(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            CacheError::Timeout("GET took 5000ms".to_string()).to_string(),
            "Cache operation timed out: GET took 5000ms"
        );
        assert_eq!(
            CacheError::ConnectionError("refused".to_string()).to_string(),
            "Cache connection error: refused"
        );
    }

    #[test]
    fn test_backend_io_classification() {
        assert!(CacheError::ConnectionError(String::new()).is_backend_io());
        assert!(CacheError::Timeout(String::new()).is_backend_io());
        assert!(CacheError::BackendError(String::new()).is_backend_io());
        assert!(!CacheError::SerializationError(String::new()).is_backend_io());
        assert!(!CacheError::WarmingError(String::new()).is_backend_io());
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let cache_err: CacheError = err.into();
        assert!(matches!(cache_err, CacheError::SerializationError(_)));
    }
}
