//! The ingestion pipeline: documents in, linked + embedded chunks out.
//!
//! `ingest` turns raw text into sentence-window [`Node`]s, embeds each
//! node's window text, and writes the results to the node store and vector
//! index. A single document is atomic with respect to the store pair: its
//! nodes exist in both stores or in neither after any outcome.
//!
//! Three execution policies trade throughput for resource usage
//! ([`IngestMode`]); all three produce an identical resulting index state
//! for identical input.

use std::sync::Arc;

use futures_util::{StreamExt, stream};

use crate::config::{IngestMode, IngestionConfig};
use crate::error::RagError;
use crate::nodes::{Document, IngestedDoc, Node, SentenceWindowSplitter};
use crate::providers::EmbeddingProvider;
use crate::stores::{NodeStore, VectorEntry, VectorIndex};

/// Ingests documents into the node store and vector index.
///
/// Constructed once at startup and shared across requests; all methods take
/// `&self`.
pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    node_store: Arc<dyn NodeStore>,
    vector_index: Arc<dyn VectorIndex>,
    splitter: SentenceWindowSplitter,
    config: IngestionConfig,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        node_store: Arc<dyn NodeStore>,
        vector_index: Arc<dyn VectorIndex>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            node_store,
            vector_index,
            splitter: SentenceWindowSplitter::new(config.window_size),
            config,
        }
    }

    /// Ingest a single document, returning its descriptor.
    ///
    /// Content that yields no chunks (empty or whitespace-only text) fails
    /// with [`RagError::UnsupportedContent`] without writing anything.
    pub async fn ingest(
        &self,
        file_name: &str,
        text: &str,
    ) -> Result<Vec<IngestedDoc>, RagError> {
        tracing::info!(file_name, "ingesting document");
        let descriptor = self.ingest_document(Document::new(file_name, text)).await?;
        tracing::info!(file_name, doc_id = %descriptor.doc_id, "finished ingestion");
        Ok(vec![descriptor])
    }

    /// Ingest several documents under the configured execution policy.
    ///
    /// A failing document is logged and skipped unless `fail_fast` is set,
    /// in which case the first failure aborts the remaining documents.
    pub async fn ingest_bulk(
        &self,
        files: Vec<(String, String)>,
    ) -> Result<Vec<IngestedDoc>, RagError> {
        tracing::info!(count = files.len(), mode = ?self.config.mode, "bulk ingestion");
        let documents: Vec<Document> = files
            .into_iter()
            .map(|(name, text)| Document::new(&name, text))
            .collect();

        match self.config.mode {
            IngestMode::Simple => self.ingest_sequential(documents).await,
            IngestMode::Batch => self.ingest_batched(documents).await,
            IngestMode::Parallel => self.ingest_parallel(documents).await,
        }
    }

    /// Delete every node of the given document from both stores.
    ///
    /// Fails with [`RagError::NotFound`] when the document id is unknown.
    /// Vectors go first: if that fails nothing has changed, and if the node
    /// deletion then fails the refs survive, so a retry completes the job.
    pub async fn delete(&self, doc_id: &str) -> Result<(), RagError> {
        tracing::info!(doc_id, "deleting ingested document");
        let vectors = self.vector_index.delete_by_doc_id(doc_id).await?;
        let nodes = self.node_store.delete_document_refs(doc_id).await?;
        if vectors == 0 && nodes == 0 {
            return Err(RagError::NotFound(doc_id.to_string()));
        }
        tracing::debug!(doc_id, nodes, vectors, "deleted document nodes");
        Ok(())
    }

    /// List descriptors for every currently ingested document.
    ///
    /// A listing failure in the node store is logged and yields an empty
    /// list rather than an error.
    pub async fn list_ingested(&self) -> Vec<IngestedDoc> {
        match self.node_store.all_document_refs().await {
            Ok(refs) => refs
                .into_iter()
                .map(|doc_ref| IngestedDoc::new(doc_ref.doc_id, doc_ref.metadata))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to list ingested documents");
                Vec::new()
            }
        }
    }

    async fn ingest_sequential(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<IngestedDoc>, RagError> {
        let mut descriptors = Vec::with_capacity(documents.len());
        for document in documents {
            match self.ingest_document(document).await {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) if self.config.fail_fast => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping failed document in bulk ingest");
                }
            }
        }
        Ok(descriptors)
    }

    /// Batch policy: chunk every document up front, embed the combined
    /// window list in provider-sized batches, then write per document.
    ///
    /// The embedding pass is shared across documents, so an embedding
    /// failure aborts the whole call regardless of `fail_fast` — nothing
    /// has been written at that point, so no document is left partially
    /// ingested. Per-document write failures stay isolated as in the other
    /// policies.
    async fn ingest_batched(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<IngestedDoc>, RagError> {
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            let nodes = self.splitter.split(&document);
            if nodes.is_empty() {
                let err = RagError::UnsupportedContent(format!(
                    "document '{}' produced no chunks",
                    document.doc_id
                ));
                if self.config.fail_fast {
                    return Err(err);
                }
                tracing::warn!(error = %err, "skipping failed document in bulk ingest");
                continue;
            }
            prepared.push((document, nodes));
        }

        let windows: Vec<String> = prepared
            .iter()
            .flat_map(|(_, nodes)| nodes.iter().map(|node| node.window.clone()))
            .collect();
        let batch_size = self.config.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(windows.len());
        for batch in windows.chunks(batch_size) {
            embeddings.extend(self.embedder.embed_batch(batch).await?);
        }

        let mut descriptors = Vec::with_capacity(prepared.len());
        let mut remaining = embeddings;
        for (document, nodes) in prepared {
            let doc_embeddings: Vec<Vec<f32>> = remaining.drain(..nodes.len()).collect();
            match self.write_document(&document, nodes, doc_embeddings).await {
                Ok(()) => descriptors.push(IngestedDoc::from_document(&document)),
                Err(err) if self.config.fail_fast => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping failed document in bulk ingest");
                }
            }
        }
        Ok(descriptors)
    }

    async fn ingest_parallel(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<IngestedDoc>, RagError> {
        let workers = self.config.workers.max(1);
        let mut results = stream::iter(documents)
            .map(|document| self.ingest_document(document))
            .buffered(workers);

        let mut descriptors = Vec::new();
        while let Some(result) = results.next().await {
            match result {
                Ok(descriptor) => descriptors.push(descriptor),
                // Dropping the stream cancels the in-flight siblings.
                Err(err) if self.config.fail_fast => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping failed document in bulk ingest");
                }
            }
        }
        Ok(descriptors)
    }

    /// Chunk, embed, and persist one document atomically.
    async fn ingest_document(&self, document: Document) -> Result<IngestedDoc, RagError> {
        let nodes = self.splitter.split(&document);
        if nodes.is_empty() {
            return Err(RagError::UnsupportedContent(format!(
                "document '{}' produced no chunks",
                document.doc_id
            )));
        }

        // Embed everything before writing anything: a provider failure must
        // leave both stores untouched.
        let windows: Vec<String> = nodes.iter().map(|node| node.window.clone()).collect();
        let batch_size = self.config.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(windows.len());
        for batch in windows.chunks(batch_size) {
            embeddings.extend(self.embedder.embed_batch(batch).await?);
        }

        self.write_document(&document, nodes, embeddings).await?;
        Ok(IngestedDoc::from_document(&document))
    }

    /// Write a document's nodes and vectors, keeping the store pair
    /// consistent: a vector write failure rolls the node writes back.
    async fn write_document(
        &self,
        document: &Document,
        nodes: Vec<Node>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), RagError> {
        let entries = build_vector_entries(&nodes, embeddings);

        self.node_store.put_nodes(nodes).await?;
        if let Err(err) = self.vector_index.upsert(entries).await {
            tracing::warn!(doc_id = %document.doc_id, error = %err, "vector write failed, rolling back nodes");
            let _ = self.node_store.delete_document_refs(&document.doc_id).await;
            return Err(err);
        }
        Ok(())
    }
}

fn build_vector_entries(nodes: &[Node], embeddings: Vec<Vec<f32>>) -> Vec<VectorEntry> {
    nodes
        .iter()
        .zip(embeddings)
        .map(|(node, embedding)| VectorEntry {
            node_id: node.id.clone(),
            doc_id: node.ref_doc_id.clone(),
            embedding,
            metadata: node.curated_metadata(),
        })
        .collect()
}
