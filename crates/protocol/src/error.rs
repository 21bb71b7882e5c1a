//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering record encoding and enum parsing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize a record.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a record.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A sort key name that is not one of the six known orders.
    #[error("unknown sort key: {0}")]
    UnknownSortKey(String),

    /// An upload filter order other than `deny,allow` or `allow,deny`.
    #[error("unknown upload order: {0}")]
    UnknownUploadOrder(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_display() {
        let err = ProtocolError::Serialization("key must be a string".to_string());
        assert_eq!(err.to_string(), "serialization failed: key must be a string");
    }

    #[test]
    fn test_deserialization_error_display() {
        let err = ProtocolError::Deserialization("unexpected end of input".to_string());
        assert_eq!(
            err.to_string(),
            "deserialization failed: unexpected end of input"
        );
    }

    #[test]
    fn test_unknown_sort_key_display() {
        let err = ProtocolError::UnknownSortKey("colour".to_string());
        assert_eq!(err.to_string(), "unknown sort key: colour");
    }

    #[test]
    fn test_unknown_upload_order_display() {
        let err = ProtocolError::UnknownUploadOrder("allow".to_string());
        assert_eq!(err.to_string(), "unknown upload order: allow");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let protocol_err: ProtocolError = json_err.into();
        assert!(matches!(protocol_err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
