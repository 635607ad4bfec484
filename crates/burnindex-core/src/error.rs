//! Error types for the burnindex pipeline.

use thiserror::Error;

/// Substrings that mark an RPC or database failure as a transient
/// infrastructure fault (rate limiting, timeouts, dropped connections).
const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "too-many-requests",
    "http 429",
    "exceeded",
    "timeout",
    "timed out",
    "connection refused",
    "connection-refused",
    "econnrefused",
    "connection reset",
    "network error",
    "error sending request",
    "pool timed out",
];

/// Returns `true` if `message` describes a transient infrastructure fault.
///
/// Matching is case-insensitive and purely substring based, so it works on
/// errors coming from `reqwest`, JSON-RPC providers and `sqlx` alike.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Coarse classification of a failure, used to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Rate limit, timeout, refused connection: retry with backoff, may switch endpoint.
    TransientRpc,
    /// Invalid descriptor or chain mismatch: the indexer must not start.
    PermanentConfig,
    /// Storage failure: the batch transaction rolled back, retry later.
    Persistence,
    /// Anything else (decode failures, unexpected responses).
    Other,
}

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error in {event} log of tx {tx_hash}: {reason}")]
    Decode {
        event: &'static str,
        tx_hash: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Classify this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Rpc(msg) if is_transient_message(msg) => FaultKind::TransientRpc,
            Self::Config(_) => FaultKind::PermanentConfig,
            Self::Storage(_) => FaultKind::Persistence,
            _ => FaultKind::Other,
        }
    }

    /// Returns `true` if a retry with backoff is worthwhile.
    ///
    /// Storage errors count when their message looks like a dropped or
    /// saturated connection.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc(msg) | Self::Storage(msg) => is_transient_message(msg),
            _ => false,
        }
    }

    /// Returns `true` for configuration faults, which are fatal at start-up.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_markers_match_case_insensitively() {
        assert!(is_transient_message("HTTP 429 Too Many Requests"));
        assert!(is_transient_message("daily request limit EXCEEDED"));
        assert!(is_transient_message("operation timed out"));
        assert!(is_transient_message("tcp connect error: Connection refused (os error 111)"));
        assert!(is_transient_message("Rate limit reached for this key"));
        assert!(!is_transient_message("execution reverted"));
        assert!(!is_transient_message("invalid params"));
    }

    #[test]
    fn kind_classification() {
        assert_eq!(
            IndexerError::Rpc("request timeout".into()).kind(),
            FaultKind::TransientRpc
        );
        assert_eq!(IndexerError::Rpc("bad response".into()).kind(), FaultKind::Other);
        assert_eq!(
            IndexerError::Config("bad address".into()).kind(),
            FaultKind::PermanentConfig
        );
        assert_eq!(
            IndexerError::Storage("unique violation".into()).kind(),
            FaultKind::Persistence
        );
    }

    #[test]
    fn storage_connection_loss_is_transient() {
        assert!(IndexerError::Storage("pool timed out while waiting for an open connection".into())
            .is_transient());
        assert!(!IndexerError::Storage("check constraint violated".into()).is_transient());
        assert!(!IndexerError::Config("timeout".into()).is_transient());
    }
}
