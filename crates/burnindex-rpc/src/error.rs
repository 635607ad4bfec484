//! Transport-level error types.

use thiserror::Error;

use burnindex_core::error::{is_transient_message, IndexerError};

use crate::request::JsonRpcError;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The pool was built without any endpoint.
    #[error("No RPC endpoints configured for chain {chain_id}")]
    NoEndpoints { chain_id: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected response shape.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is a transient infrastructure fault.
    ///
    /// Providers report rate limiting in many shapes (HTTP 429, JSON-RPC
    /// `-32005`, free-form messages), so everything except timeouts is
    /// classified from the rendered message.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Rpc(e) if e.code == -32005 => true,
            Self::NoEndpoints { .. } | Self::Deserialization(_) => false,
            other => is_transient_message(&other.to_string()),
        }
    }
}

impl From<TransportError> for IndexerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NoEndpoints { .. } => IndexerError::Config(e.to_string()),
            other => IndexerError::Rpc(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TransportError::Timeout { ms: 20_000 }.is_transient());
        assert!(TransportError::Http("HTTP 429: Too Many Requests".into()).is_transient());
        assert!(TransportError::Http("error sending request for url".into()).is_transient());
        assert!(!TransportError::Http("HTTP 400: bad request".into()).is_transient());
        assert!(TransportError::Rpc(JsonRpcError {
            code: -32005,
            message: "limit".into(),
            data: None
        })
        .is_transient());
        assert!(!TransportError::Rpc(JsonRpcError {
            code: -32602,
            message: "invalid params".into(),
            data: None
        })
        .is_transient());
    }

    #[test]
    fn timeouts_stay_transient_after_conversion() {
        let err: IndexerError = TransportError::Timeout { ms: 5 }.into();
        assert!(err.is_transient());
        let err: IndexerError = TransportError::NoEndpoints { chain_id: 1 }.into();
        assert!(err.is_config());
    }
}
