//! Chat orchestration: turn lists in, grounded or plain completions out.
//!
//! [`ChatEngineInput`] normalizes a raw turn list into system prompt,
//! history, and latest user message. [`ChatService`] then either asks the
//! model directly (simple mode) or first retrieves context, applies the
//! similarity cutoff and optional reranking, and grounds the model on the
//! surviving chunks' window texts (context mode).
//!
//! Streaming responses hand back a `flume` receiver; dropping it cancels
//! generation at the provider within one step.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::RagError;
use crate::message::ChatTurn;
use crate::nodes::RetrievedChunk;
use crate::providers::{ChatPrompt, LanguageModel};
use crate::retriever::{ContextFilter, Reranker, Retriever, ScoredNode};

const GROUNDING_PREAMBLE: &str = "Context information is below.\n\
---------------------\n";
const GROUNDING_POSTAMBLE: &str = "\n---------------------\n\
Given the context information and not prior knowledge, answer the query.";

/// A raw chat turn list decomposed into its prompt roles.
///
/// Parsing rules: a leading system turn becomes the system prompt; a
/// trailing user turn becomes the latest message, otherwise the latest
/// message is empty; everything else is history in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEngineInput {
    pub system_prompt: Option<String>,
    pub history: Vec<ChatTurn>,
    pub latest_message: String,
}

impl ChatEngineInput {
    pub fn from_turns(turns: Vec<ChatTurn>) -> Result<Self, RagError> {
        let mut turns = turns;
        if turns.is_empty() {
            return Err(RagError::InvalidRequest("chat requires at least one turn".into()));
        }

        let system_prompt = match turns.first() {
            Some(first) if first.has_role(ChatTurn::SYSTEM) => Some(turns.remove(0).content),
            _ => None,
        };

        let latest_message = match turns.last() {
            Some(last) if last.has_role(ChatTurn::USER) => {
                turns.pop().map(|turn| turn.content).unwrap_or_default()
            }
            // No user tail: keep every turn as history and let the model
            // answer an empty prompt.
            _ => String::new(),
        };

        Ok(Self {
            system_prompt,
            history: turns,
            latest_message,
        })
    }
}

/// A finished chat response with the chunks it was grounded on.
#[derive(Clone, Debug)]
pub struct Completion {
    pub response: String,
    pub sources: Vec<RetrievedChunk>,
}

/// An in-flight chat response. Sources are known up front; tokens arrive on
/// the channel as the model produces them, and a provider failure arrives
/// in-band as the final `Err` item. Dropping the receiver cancels
/// generation.
pub struct StreamingCompletion {
    pub tokens: flume::Receiver<Result<String, RagError>>,
    pub sources: Vec<RetrievedChunk>,
}

/// Orchestrates retrieval and language model calls for chat requests.
pub struct ChatService {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<Retriever>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<Retriever>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            llm,
            retriever,
            reranker,
            config,
        }
    }

    /// Answer a chat request, materializing the full response.
    pub async fn chat(
        &self,
        turns: Vec<ChatTurn>,
        use_context: bool,
        filter: &ContextFilter,
    ) -> Result<Completion, RagError> {
        let input = ChatEngineInput::from_turns(turns)?;
        let (prompt, sources) = self.assemble(&input, use_context, filter).await?;
        let response = self.llm.complete(&prompt).await?;
        Ok(Completion { response, sources })
    }

    /// Answer a chat request as a token stream.
    ///
    /// Retrieval happens before this returns, so sources are complete in the
    /// result; generation runs on a background task feeding the channel.
    pub async fn stream_chat(
        &self,
        turns: Vec<ChatTurn>,
        use_context: bool,
        filter: &ContextFilter,
    ) -> Result<StreamingCompletion, RagError> {
        let input = ChatEngineInput::from_turns(turns)?;
        let (prompt, sources) = self.assemble(&input, use_context, filter).await?;

        let (tx, rx) = flume::unbounded();
        let llm = self.llm.clone();
        tokio::spawn(async move {
            // The provider writes plain tokens; forward them wrapped in Ok
            // and deliver a generation failure in-band as the final item.
            let (raw_tx, raw_rx) = flume::unbounded::<String>();
            let forward_tx = tx.clone();
            let forward = async move {
                while let Ok(token) = raw_rx.recv_async().await {
                    if forward_tx.send_async(Ok(token)).await.is_err() {
                        // Caller dropped the stream; dropping raw_rx makes
                        // the provider's next send fail and stop generating.
                        break;
                    }
                }
            };
            let (result, ()) = tokio::join!(llm.stream_complete(&prompt, raw_tx), forward);
            if let Err(err) = result {
                tracing::warn!(error = %err, "streaming completion failed");
                let _ = tx.send_async(Err(err)).await;
            }
        });

        Ok(StreamingCompletion {
            tokens: rx,
            sources,
        })
    }

    async fn assemble(
        &self,
        input: &ChatEngineInput,
        use_context: bool,
        filter: &ContextFilter,
    ) -> Result<(ChatPrompt, Vec<RetrievedChunk>), RagError> {
        let grounding = if use_context {
            self.retrieve_grounding(input, filter).await?
        } else {
            Vec::new()
        };

        let system = build_system_prompt(input.system_prompt.as_deref(), &grounding);
        let sources = grounding
            .iter()
            .map(|scored| RetrievedChunk::from_node(&scored.node, scored.score))
            .collect();

        let prompt = ChatPrompt {
            system,
            history: input.history.clone(),
            message: input.latest_message.clone(),
        };
        Ok((prompt, sources))
    }

    /// First-pass retrieval, similarity cutoff, then optional rerank.
    ///
    /// The cutoff drops low-scoring hits before reranking ever sees them;
    /// the reranker may only reorder and truncate what remains.
    async fn retrieve_grounding(
        &self,
        input: &ChatEngineInput,
        filter: &ContextFilter,
    ) -> Result<Vec<ScoredNode>, RagError> {
        let query = input.latest_message.as_str();
        let mut scored = match self
            .retriever
            .retrieve(query, filter, self.config.similarity_top_k)
            .await
        {
            Ok(scored) => scored,
            Err(RagError::StoreUnavailable(reason)) if self.config.degrade_to_simple => {
                tracing::warn!(%reason, "store unavailable, answering without context");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        if let Some(cutoff) = self.config.similarity_cutoff {
            scored.retain(|candidate| candidate.score >= cutoff);
        }

        if self.config.rerank.enabled
            && let Some(reranker) = &self.reranker
        {
            scored = reranker.rerank(query, scored, self.config.rerank.top_n);
        }

        tracing::debug!(chunks = scored.len(), "grounding context assembled");
        Ok(scored)
    }
}

/// Merge the grounding block (when any chunks survived) with the caller's
/// system prompt. With no chunks the caller's prompt passes through as-is.
fn build_system_prompt(caller_system: Option<&str>, grounding: &[ScoredNode]) -> Option<String> {
    if grounding.is_empty() {
        return caller_system.map(str::to_string);
    }

    let context: Vec<&str> = grounding
        .iter()
        .map(|scored| scored.node.window.as_str())
        .collect();
    let mut system = format!(
        "{GROUNDING_PREAMBLE}{}{GROUNDING_POSTAMBLE}",
        context.join("\n\n")
    );
    if let Some(caller) = caller_system {
        system.push_str("\n\n");
        system.push_str(caller);
    }
    Some(system)
}
