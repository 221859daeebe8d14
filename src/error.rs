//! Error taxonomy shared across the ingestion, retrieval, and chat layers.
//!
//! Every fallible operation in ragmill returns [`RagError`]. The variants map
//! one-to-one onto caller-visible outcomes: a `NotFound` can become a 404, a
//! `ProviderUnavailable` a 503, and so on. No layer retries internally;
//! retry/backoff policy belongs to the caller.

use thiserror::Error;

/// Unified error type for all ragmill operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The referenced document id is unknown to the stores.
    #[error("document '{0}' not found")]
    NotFound(String),

    /// Ingestion received content it cannot turn into chunks.
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// The embedding or language-model backend is unreachable or timed out.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The vector index or node store failed mid-operation.
    ///
    /// At construction time a store connectivity failure triggers the
    /// in-memory fallback instead of surfacing this variant.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The request itself is malformed (e.g. an empty chat turn sequence).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization failure inside a store implementation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RagError {
    /// Short machine-readable kind, useful for logging and HTTP mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::NotFound(_) => "not_found",
            RagError::UnsupportedContent(_) => "unsupported_content",
            RagError::ProviderUnavailable(_) => "provider_unavailable",
            RagError::StoreUnavailable(_) => "store_unavailable",
            RagError::InvalidRequest(_) => "invalid_request",
            RagError::Storage(_) => "storage",
        }
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}
