//! Error types shared by the tradeflow crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, TradeflowError>;

/// Errors that are not specific to the import pipeline or the HTTP layer
#[derive(Error, Debug)]
pub enum TradeflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_date_message() {
        let err = TradeflowError::InvalidDate("03/01/2024".to_string());
        assert_eq!(err.to_string(), "Invalid date '03/01/2024': expected YYYY-MM-DD");
    }

    #[test]
    fn test_io_conversion() {
        let err: TradeflowError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, TradeflowError::Io(_)));
    }
}
