//! Error types for gpuward

use thiserror::Error;

/// Main error type for gpuward
#[derive(Error, Debug)]
pub enum GpuwardError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device or scheduler source unreachable or timed out
    #[error("Query unavailable: {0}")]
    QueryUnavailable(String),

    /// Device or scheduler source returned output that cannot be parsed
    #[error("Malformed query output: {0}")]
    QueryMalformed(String),

    /// Enforcement error
    #[error("Enforcement error: {0}")]
    Enforcement(String),

    /// A decision referenced a job not active in the same cycle
    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    /// Audit log error
    #[error("Audit error: {0}")]
    Audit(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for gpuward operations
pub type GpuwardResult<T> = Result<T, GpuwardError>;

impl From<serde_json::Error> for GpuwardError {
    fn from(err: serde_json::Error) -> Self {
        GpuwardError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpuwardError {
    fn from(err: toml::de::Error) -> Self {
        GpuwardError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GpuwardError::QueryUnavailable("device query timed out".to_string());
        assert_eq!(err.to_string(), "Query unavailable: device query timed out");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GpuwardError = io_err.into();
        assert!(matches!(err, GpuwardError::Io(_)));
    }
}
