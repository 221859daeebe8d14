//! Sentence-window chunking.
//!
//! Splits document text into sentences and builds one [`Node`] per sentence,
//! each carrying a window of surrounding sentences for context and id links
//! to its previous/next sibling.

use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use super::{DOC_ID_KEY, Document, Node, ORIGINAL_TEXT_KEY, WINDOW_KEY};

/// Splits documents into sentence-centered windowed nodes.
///
/// Each node is centered on one sentence; its `window` text is that sentence
/// plus up to `window_size` sentences on each side, clipped at document
/// boundaries. Nodes of one document form a doubly-linked chain via
/// `prev_id`/`next_id`.
#[derive(Clone, Copy, Debug)]
pub struct SentenceWindowSplitter {
    window_size: usize,
}

impl Default for SentenceWindowSplitter {
    fn default() -> Self {
        Self { window_size: 3 }
    }
}

impl SentenceWindowSplitter {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Split a document into linked, windowed nodes in document order.
    ///
    /// Returns an empty vector for text with no sentences. Node metadata
    /// inherits the document metadata and adds the `doc_id`, `window`, and
    /// `original_text` bookkeeping keys that curation strips on exposure.
    pub fn split(&self, document: &Document) -> Vec<Node> {
        let sentences = split_sentences(&document.text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = sentences
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let mut nodes = Vec::with_capacity(sentences.len());
        for (index, sentence) in sentences.iter().enumerate() {
            let lo = index.saturating_sub(self.window_size);
            let hi = (index + self.window_size + 1).min(sentences.len());
            let window = sentences[lo..hi].join(" ");

            let mut metadata = document.metadata.clone();
            metadata.insert(
                DOC_ID_KEY.to_string(),
                serde_json::Value::String(document.doc_id.clone()),
            );
            metadata.insert(
                WINDOW_KEY.to_string(),
                serde_json::Value::String(window.clone()),
            );
            metadata.insert(
                ORIGINAL_TEXT_KEY.to_string(),
                serde_json::Value::String(sentence.clone()),
            );

            nodes.push(Node {
                id: ids[index].clone(),
                ref_doc_id: document.doc_id.clone(),
                text: sentence.clone(),
                window,
                prev_id: (index > 0).then(|| ids[index - 1].clone()),
                next_id: (index + 1 < ids.len()).then(|| ids[index + 1].clone()),
                metadata,
            });
        }
        nodes
    }
}

/// Split text into trimmed, non-empty sentences using Unicode sentence
/// boundaries.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split_sentence_bounds()
        .map(|sentence| sentence.trim())
        .filter(|sentence| !sentence.is_empty())
        .map(|sentence| sentence.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::Metadata;

    fn sample_document() -> Document {
        Document::new(
            "report.txt",
            "Sales rose sharply. Inbound was flat. New leads came from ads. \
             Marketing ran the campaign. Costs stayed level.",
        )
    }

    #[test]
    fn splits_into_trimmed_sentences() {
        let sentences = split_sentences("One.  Two!   Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn empty_text_yields_no_nodes() {
        let splitter = SentenceWindowSplitter::default();
        let doc = Document::new("empty.txt", "   \n  ");
        assert!(splitter.split(&doc).is_empty());
    }

    #[test]
    fn sibling_links_form_a_chain() {
        let splitter = SentenceWindowSplitter::new(1);
        let nodes = splitter.split(&sample_document());
        assert_eq!(nodes.len(), 5);

        assert!(nodes[0].prev_id.is_none());
        assert!(nodes[4].next_id.is_none());
        for pair in nodes.windows(2) {
            assert_eq!(pair[0].next_id.as_deref(), Some(pair[1].id.as_str()));
            assert_eq!(pair[1].prev_id.as_deref(), Some(pair[0].id.as_str()));
        }
    }

    #[test]
    fn window_clips_at_document_boundaries() {
        let splitter = SentenceWindowSplitter::new(1);
        let nodes = splitter.split(&sample_document());

        // First node: no sentence before it.
        assert_eq!(nodes[0].window, "Sales rose sharply. Inbound was flat.");
        // Interior node: one sentence on each side.
        assert_eq!(
            nodes[2].window,
            "Inbound was flat. New leads came from ads. Marketing ran the campaign."
        );
    }

    #[test]
    fn node_metadata_carries_bookkeeping_keys() {
        let splitter = SentenceWindowSplitter::default();
        let doc = sample_document();
        let nodes = splitter.split(&doc);

        let metadata: &Metadata = &nodes[0].metadata;
        assert_eq!(metadata[DOC_ID_KEY], serde_json::json!(doc.doc_id));
        assert_eq!(metadata[ORIGINAL_TEXT_KEY], serde_json::json!(nodes[0].text));
        assert_eq!(metadata[WINDOW_KEY], serde_json::json!(nodes[0].window));
        assert!(metadata.contains_key("file_name"));
    }
}
