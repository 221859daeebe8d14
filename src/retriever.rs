//! Retrieval engine: query text in, scored context chunks out.
//!
//! [`Retriever::retrieve`] embeds the query, searches the vector index
//! (optionally scoped to named documents), and hydrates the hits back into
//! nodes. [`Retriever::retrieve_relevant`] additionally walks each hit's
//! sibling chain in both directions to attach surrounding narrow texts,
//! which is what the chunk-lookup surface serves.
//!
//! Reranking is a second scoring pass behind the [`Reranker`] seam: it may
//! reorder and truncate the candidate list but never introduces chunks the
//! first pass did not produce.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::RagError;
use crate::nodes::{Node, RetrievedChunk};
use crate::providers::EmbeddingProvider;
use crate::stores::{DocIdFilter, NodeStore, VectorIndex};

/// Caller-supplied retrieval scope: restrict hits to these document ids.
/// `None` (or an empty list) means search everything.
#[derive(Clone, Debug, Default)]
pub struct ContextFilter {
    pub docs_ids: Option<Vec<String>>,
}

impl ContextFilter {
    pub fn for_docs(doc_ids: Vec<String>) -> Self {
        Self {
            docs_ids: Some(doc_ids),
        }
    }

    fn to_doc_filter(&self) -> Option<DocIdFilter> {
        match &self.docs_ids {
            Some(ids) if !ids.is_empty() => Some(DocIdFilter::new(ids.clone())),
            _ => None,
        }
    }
}

/// A hydrated search hit: the stored node plus its similarity score.
#[derive(Clone, Debug)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f32,
}

/// Embeds queries and resolves vector hits against the node store.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    node_store: Arc<dyn NodeStore>,
    vector_index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        node_store: Arc<dyn NodeStore>,
        vector_index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            node_store,
            vector_index,
        }
    }

    /// Top-`limit` nodes most similar to `text`, descending by score.
    ///
    /// Hits whose node has vanished from the node store are dropped with a
    /// warning rather than failing the query.
    pub async fn retrieve(
        &self,
        text: &str,
        filter: &ContextFilter,
        limit: usize,
    ) -> Result<Vec<ScoredNode>, RagError> {
        let query = self.embedder.embed(text).await?;
        let doc_filter = filter.to_doc_filter();
        let hits = self
            .vector_index
            .search(&query, limit, doc_filter.as_ref())
            .await?;
        tracing::debug!(hits = hits.len(), limit, "vector search complete");

        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.node_store.get_node(&hit.node_id).await? {
                Some(node) => scored.push(ScoredNode {
                    node,
                    score: hit.score,
                }),
                None => {
                    tracing::warn!(node_id = %hit.node_id, "vector hit has no stored node, skipping");
                }
            }
        }
        Ok(scored)
    }

    /// Top-`limit` chunks for `text`, each with up to `sibling_window` narrow
    /// texts from the preceding and following siblings attached.
    ///
    /// Sibling walks stop early at a chain boundary or at a missing node;
    /// a miss truncates that direction's texts without failing the query.
    pub async fn retrieve_relevant(
        &self,
        text: &str,
        filter: &ContextFilter,
        limit: usize,
        sibling_window: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let scored = self.retrieve(text, filter, limit).await?;
        let mut chunks = Vec::with_capacity(scored.len());
        for ScoredNode { node, score } in scored {
            let mut chunk = RetrievedChunk::from_node(&node, score);
            chunk.previous_texts =
                Some(self.walk_siblings(&node, Direction::Prev, sibling_window).await?);
            chunk.next_texts =
                Some(self.walk_siblings(&node, Direction::Next, sibling_window).await?);
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Collect up to `steps` sibling narrow texts in one direction, nearest
    /// sibling first.
    async fn walk_siblings(
        &self,
        node: &Node,
        direction: Direction,
        steps: usize,
    ) -> Result<Vec<String>, RagError> {
        let mut texts = Vec::new();
        let mut cursor = direction.link(node).cloned();
        while texts.len() < steps {
            let Some(node_id) = cursor else { break };
            match self.node_store.get_node(&node_id).await? {
                Some(sibling) => {
                    texts.push(sibling.text.clone());
                    cursor = direction.link(&sibling).cloned();
                }
                None => {
                    tracing::warn!(node_id = %node_id, "sibling link points at missing node");
                    break;
                }
            }
        }
        Ok(texts)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Prev,
    Next,
}

impl Direction {
    fn link<'a>(self, node: &'a Node) -> Option<&'a String> {
        match self {
            Direction::Prev => node.prev_id.as_ref(),
            Direction::Next => node.next_id.as_ref(),
        }
    }
}

/// Second-pass scoring over first-pass candidates.
///
/// Implementations reorder and truncate the list to at most `top_n`; they
/// never add chunks of their own.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: Vec<ScoredNode>, top_n: usize) -> Vec<ScoredNode>;
}

/// Lexical reranker: orders candidates by how many distinct query terms
/// appear in their window text. Vector scores are left untouched; term
/// overlap only decides the ordering, with the first-pass order as tie-break.
#[derive(Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    pub fn new() -> Self {
        Self
    }

    fn overlap(query_terms: &HashSet<String>, window: &str) -> usize {
        let window_terms: HashSet<String> = tokenize(window).collect();
        query_terms.intersection(&window_terms).count()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| term.to_lowercase())
}

impl Reranker for TermOverlapReranker {
    fn rerank(&self, query: &str, candidates: Vec<ScoredNode>, top_n: usize) -> Vec<ScoredNode> {
        let query_terms: HashSet<String> = tokenize(query).collect();
        let mut ranked: Vec<(usize, ScoredNode)> = candidates
            .into_iter()
            .map(|candidate| {
                (
                    Self::overlap(&query_terms, &candidate.node.window),
                    candidate,
                )
            })
            .collect();
        // Stable sort keeps the first-pass order for equal overlap.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.truncate(top_n);
        ranked.into_iter().map(|(_, candidate)| candidate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionConfig;
    use crate::ingestion::IngestPipeline;
    use crate::providers::MockEmbedder;
    use crate::stores::{InMemoryNodeStore, InMemoryVectorIndex};

    struct Fixture {
        pipeline: IngestPipeline,
        retriever: Retriever,
    }

    fn fixture() -> Fixture {
        let embedder = Arc::new(MockEmbedder::new(128));
        let node_store = Arc::new(InMemoryNodeStore::new());
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        Fixture {
            pipeline: IngestPipeline::new(
                embedder.clone(),
                node_store.clone(),
                vector_index.clone(),
                IngestionConfig {
                    window_size: 1,
                    ..IngestionConfig::default()
                },
            ),
            retriever: Retriever::new(embedder, node_store, vector_index),
        }
    }

    #[tokio::test]
    async fn retrieves_most_similar_chunk_first() {
        let fx = fixture();
        fx.pipeline
            .ingest(
                "animals.txt",
                "Cats sleep during daytime hours. Dogs bark at strangers loudly. Fish swim in cold water.",
            )
            .await
            .unwrap();

        let hits = fx
            .retriever
            .retrieve("why do dogs bark", &ContextFilter::default(), 3)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        // Similarity is computed over window text, so the winner is the hit
        // whose window carries the matching sentence.
        assert!(hits[0].node.window.contains("Dogs bark"));
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[tokio::test]
    async fn sibling_texts_clip_at_document_boundaries() {
        let fx = fixture();
        fx.pipeline
            .ingest(
                "story.txt",
                "Alpha begins the tale. Beta continues onward. Gamma ends everything.",
            )
            .await
            .unwrap();

        let chunks = fx
            .retriever
            .retrieve_relevant("Alpha begins the tale", &ContextFilter::default(), 1, 3)
            .await
            .unwrap();
        let chunk = &chunks[0];
        assert_eq!(chunk.text, "Alpha begins the tale.");
        // First node: nothing before it, the rest of the chain after it.
        assert_eq!(chunk.previous_texts.as_deref(), Some(&[][..]));
        assert_eq!(
            chunk.next_texts.as_deref(),
            Some(&["Beta continues onward.".to_string(), "Gamma ends everything.".to_string()][..])
        );
    }

    #[tokio::test]
    async fn filter_restricts_to_named_documents() {
        let fx = fixture();
        let docs = fx
            .pipeline
            .ingest_bulk(vec![
                ("a.txt".into(), "Quarterly revenue grew substantially.".into()),
                ("b.txt".into(), "Quarterly revenue shrank badly.".into()),
            ])
            .await
            .unwrap();

        let filter = ContextFilter::for_docs(vec![docs[1].doc_id.clone()]);
        let hits = fx
            .retriever
            .retrieve("quarterly revenue", &filter, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.ref_doc_id, docs[1].doc_id);
    }

    #[tokio::test]
    async fn empty_filter_list_means_unrestricted() {
        let fx = fixture();
        fx.pipeline
            .ingest("a.txt", "A single short sentence.")
            .await
            .unwrap();

        let filter = ContextFilter {
            docs_ids: Some(vec![]),
        };
        let hits = fx.retriever.retrieve("sentence", &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    fn scored(id: &str, window: &str, score: f32) -> ScoredNode {
        ScoredNode {
            node: Node {
                id: id.into(),
                ref_doc_id: "doc".into(),
                text: window.into(),
                window: window.into(),
                prev_id: None,
                next_id: None,
                metadata: crate::nodes::Metadata::new(),
            },
            score,
        }
    }

    #[test]
    fn reranker_reorders_without_adding() {
        let candidates = vec![
            scored("n1", "unrelated filler words", 0.9),
            scored("n2", "rust borrow checker rules", 0.8),
            scored("n3", "the rust compiler", 0.7),
            scored("n4", "more filler", 0.6),
            scored("n5", "rust borrow semantics explained", 0.5),
        ];
        let input_ids: HashSet<String> =
            candidates.iter().map(|c| c.node.id.clone()).collect();

        let ranked = TermOverlapReranker::new().rerank("rust borrow checker", candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].node.id, "n2");
        assert!(ranked.iter().all(|c| input_ids.contains(&c.node.id)));
        // Vector scores survive untouched.
        assert!((ranked[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn reranker_keeps_first_pass_order_on_ties() {
        let candidates = vec![
            scored("n1", "nothing relevant here", 0.9),
            scored("n2", "still nothing relevant", 0.8),
        ];
        let ranked = TermOverlapReranker::new().rerank("quantum physics", candidates, 2);
        assert_eq!(ranked[0].node.id, "n1");
        assert_eq!(ranked[1].node.id, "n2");
    }
}
