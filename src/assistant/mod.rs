//! Assisted mode: prompts produced by a generative model.
//!
//! The session controller only ever talks to the [`Assistant`] trait, so the
//! scripted flow and the model-backed path never share state.

mod fallback;
mod openai;

pub use fallback::FallbackAssistant;
pub use openai::OpenAiAssistant;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::conversation::model::Role;

/// One prior transcript entry handed to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Capability used by assisted sessions.
///
/// Implementations never fail: a provider outage degrades to canned prompts.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Greeting that opens a session.
    async fn first_prompt(&self, user_name: &str) -> String;

    /// Follow-up question given the transcript so far and the latest answer.
    async fn next_prompt(&self, history: &[HistoryEntry], latest: &str) -> String;

    /// Whether enough information has been gathered.
    async fn should_end(&self, history: &[HistoryEntry]) -> bool;
}

/// Settings for the model-backed assistant.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub api_base_url: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: openai::DEFAULT_MODEL.to_string(),
            api_base_url: openai::DEFAULT_API_URL.to_string(),
        }
    }
}

/// Pick the assistant for the given configuration.
///
/// Without an API key the deterministic fallback is used directly.
pub fn create_assistant(config: &AssistantConfig) -> Arc<dyn Assistant> {
    match &config.api_key {
        Some(key) => match OpenAiAssistant::new(key.clone(), &config.model, &config.api_base_url) {
            Ok(assistant) => {
                tracing::info!(model = %config.model, "Assisted mode using OpenAI");
                Arc::new(assistant)
            }
            Err(e) => {
                tracing::warn!("Failed to create OpenAI client, using fallback prompts: {e}");
                Arc::new(FallbackAssistant)
            }
        },
        None => {
            tracing::warn!("OPENAI_API_KEY not set, assisted mode will use fallback prompts");
            Arc::new(FallbackAssistant)
        }
    }
}
