//! Core data model: documents, chunk nodes, and their wire-visible shapes.
//!
//! A [`Document`] is the raw ingested unit. The window splitter in
//! [`window`] turns its text into [`Node`]s: sentence-sized chunks expanded
//! with surrounding context and doubly linked to their siblings by id (the
//! links are plain ids rather than pointers so they survive a remote store).
//!
//! [`IngestedDoc`] and [`RetrievedChunk`] are the response-shaped entities an
//! HTTP layer can serialize directly.

pub mod window;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use window::SentenceWindowSplitter;

/// Free-form string-keyed metadata attached to documents and nodes.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding a node's expanded window text.
pub const WINDOW_KEY: &str = "window";
/// Metadata key holding a node's narrow original text.
pub const ORIGINAL_TEXT_KEY: &str = "original_text";
/// Metadata key holding the owning document id.
pub const DOC_ID_KEY: &str = "doc_id";

/// Remove internal bookkeeping keys from metadata before exposing it.
///
/// The splitter stashes the window text, original text, and owning document
/// id in node metadata; none of those belong in caller-visible responses.
pub fn curate_metadata(mut metadata: Metadata) -> Metadata {
    metadata.remove(DOC_ID_KEY);
    metadata.remove(WINDOW_KEY);
    metadata.remove(ORIGINAL_TEXT_KEY);
    metadata
}

/// A raw ingested document: identifier, curated metadata, and full text.
///
/// Immutable once produced; the ingestion pipeline owns turning it into
/// nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub metadata: Metadata,
    pub text: String,
}

impl Document {
    /// Create a document with a fresh id, recording the source file name in
    /// its metadata.
    pub fn new(file_name: &str, text: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(
            "file_name".to_string(),
            serde_json::Value::String(file_name.to_string()),
        );
        Self {
            doc_id: Uuid::new_v4().to_string(),
            metadata,
            text: text.into(),
        }
    }

    /// Attach an additional metadata entry.
    #[must_use]
    pub fn with_metadata_entry(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// A windowed fragment of a document's text: the atomic retrieval unit.
///
/// `text` is the narrow original sentence; `window` is that sentence plus the
/// configured number of surrounding sentences. Sibling links are `None` at
/// document boundaries and otherwise form a single doubly-linked chain per
/// document, in document order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Owning document id.
    pub ref_doc_id: String,
    /// The narrow original sentence.
    pub text: String,
    /// The sentence expanded with surrounding context; this is what gets
    /// embedded and what grounded chat feeds to the model.
    pub window: String,
    pub prev_id: Option<String>,
    pub next_id: Option<String>,
    /// Document metadata plus bookkeeping keys; see [`curate_metadata`].
    pub metadata: Metadata,
}

impl Node {
    /// Metadata with the bookkeeping keys stripped.
    pub fn curated_metadata(&self) -> Metadata {
        curate_metadata(self.metadata.clone())
    }
}

/// Descriptor of an ingested document, serialized as
/// `{object:"ingest.document", doc_id, doc_metadata}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestedDoc {
    pub object: String,
    pub doc_id: String,
    pub doc_metadata: Metadata,
}

impl IngestedDoc {
    pub const OBJECT: &'static str = "ingest.document";

    pub fn new(doc_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            object: Self::OBJECT.to_string(),
            doc_id: doc_id.into(),
            doc_metadata: curate_metadata(metadata),
        }
    }

    pub fn from_document(document: &Document) -> Self {
        Self::new(document.doc_id.clone(), document.metadata.clone())
    }
}

/// A retrieval result, serialized as `{object:"context.chunk", score,
/// document, text, previous_texts?, next_texts?}`.
///
/// Ephemeral: constructed per query, never persisted. The score is a cosine
/// similarity (see the vector index implementations for the exact range).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub object: String,
    pub score: f32,
    pub document: IngestedDoc,
    /// The chunk's narrow original text.
    pub text: String,
    /// Texts of up to `sibling_window` preceding siblings, nearest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_texts: Option<Vec<String>>,
    /// Texts of up to `sibling_window` following siblings, nearest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_texts: Option<Vec<String>>,
}

impl RetrievedChunk {
    pub const OBJECT: &'static str = "context.chunk";

    /// Build a chunk from a scored node. Sibling texts start out unset; the
    /// retrieval engine fills them in when a sibling window was requested.
    pub fn from_node(node: &Node, score: f32) -> Self {
        Self {
            object: Self::OBJECT.to_string(),
            score,
            document: IngestedDoc::new(node.ref_doc_id.clone(), node.metadata.clone()),
            text: node.text.clone(),
            previous_texts: None,
            next_texts: None,
        }
    }
}
