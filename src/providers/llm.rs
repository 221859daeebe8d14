//! Language model providers: prompt in, completion out.
//!
//! The streaming variant hands tokens to a `flume` sender as they arrive.
//! A closed receiver (client disconnect) makes the next send fail, which the
//! producers treat as cancellation: they stop generating within one step and
//! drop the underlying request.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::json;

use crate::config::{LlmConfig, ProviderMode};
use crate::error::RagError;
use crate::message::ChatTurn;

/// A fully assembled prompt: optional system prompt, prior turns, and the
/// latest user message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: Option<String>,
    pub history: Vec<ChatTurn>,
    pub message: String,
}

impl ChatPrompt {
    /// Flatten into the ordered turn list a chat API expects.
    pub fn to_turns(&self) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system {
            turns.push(ChatTurn::system(system));
        }
        turns.extend(self.history.iter().cloned());
        turns.push(ChatTurn::user(&self.message));
        turns
    }
}

/// Produces completions from prompts, materialized or streamed.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the full completion text.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, RagError>;

    /// Produce the completion incrementally, sending each text increment to
    /// `tokens`. Returns when generation finishes or the receiver is gone.
    async fn stream_complete(
        &self,
        prompt: &ChatPrompt,
        tokens: flume::Sender<String>,
    ) -> Result<(), RagError>;
}

/// Construct the language model selected by configuration.
pub fn language_model(config: &LlmConfig) -> Arc<dyn LanguageModel> {
    match config.mode {
        ProviderMode::Ollama => {
            tracing::info!(model = %config.model, api_base = %config.api_base, "using remote language model");
            Arc::new(OllamaChatModel::new(config.clone()))
        }
        ProviderMode::Mock => Arc::new(MockLanguageModel::new()),
    }
}

/// Deterministic in-process model for tests and offline development.
///
/// Echoes the latest user message unless a canned reply is configured, and
/// records the last prompt it saw so tests can assert on orchestrator
/// behavior.
#[derive(Default)]
pub struct MockLanguageModel {
    reply: Option<String>,
    last_prompt: Mutex<Option<ChatPrompt>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with a fixed reply instead of echoing.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// The prompt from the most recent `complete`/`stream_complete` call.
    pub fn last_prompt(&self) -> Option<ChatPrompt> {
        self.last_prompt.lock().clone()
    }

    fn render(&self, prompt: &ChatPrompt) -> String {
        *self.last_prompt.lock() = Some(prompt.clone());
        match &self.reply {
            Some(reply) => reply.clone(),
            None => format!("echo: {}", prompt.message),
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, RagError> {
        Ok(self.render(prompt))
    }

    async fn stream_complete(
        &self,
        prompt: &ChatPrompt,
        tokens: flume::Sender<String>,
    ) -> Result<(), RagError> {
        let reply = self.render(prompt);
        for piece in reply.split_inclusive(' ') {
            if tokens.send_async(piece.to_string()).await.is_err() {
                // Receiver dropped: the caller abandoned the stream.
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// Remote model speaking the Ollama `/api/chat` protocol, including its
/// newline-delimited JSON streaming mode.
pub struct OllamaChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaChatModel {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request_body(&self, prompt: &ChatPrompt, stream: bool) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": prompt.to_turns(),
            "stream": stream,
        })
    }

    async fn send(
        &self,
        prompt: &ChatPrompt,
        stream: bool,
    ) -> Result<reqwest::Response, RagError> {
        let url = format!("{}/api/chat", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RagError::ProviderUnavailable(format!(
                "chat backend returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, RagError> {
        let response = self.send(prompt, false).await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;
        value["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| {
                RagError::ProviderUnavailable("chat backend returned no message content".into())
            })
    }

    async fn stream_complete(
        &self,
        prompt: &ChatPrompt,
        tokens: flume::Sender<String>,
    ) -> Result<(), RagError> {
        let response = self.send(prompt, true).await?;
        let mut body = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;
            buffer.extend_from_slice(&chunk);

            // The protocol is one JSON object per line; a chunk may carry
            // partial lines, so keep the tail in the buffer.
            while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(line)
                    .map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;
                if let Some(content) = value["message"]["content"].as_str()
                    && !content.is_empty()
                    && tokens.send_async(content.to_string()).await.is_err()
                {
                    // Receiver dropped; stop generating and release the
                    // connection by returning.
                    return Ok(());
                }
                if value["done"].as_bool() == Some(true) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
