//! OpenAI chat-completions client for assisted sessions.
//!
//! All wire types are private to this module. Every failure is logged and
//! answered with the fallback prompt for the same situation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::fallback::FallbackAssistant;
use super::{Assistant, HistoryEntry};
use crate::error::LlmError;

pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub(crate) const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const PROVIDER: &str = "openai";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FIRST_PROMPT_SYSTEM: &str = "You are a helpful legal assistant for EASYLEGAL, a platform that helps users with legal questions.
Your role is to gather information from users about their legal situation by asking clear, focused questions.
Be professional, empathetic, and concise. Ask one question at a time.
Your first question should be welcoming and ask about the type of legal matter they need help with.";

const NEXT_PROMPT_SYSTEM: &str = "You are a helpful legal assistant for EASYLEGAL.
Your role is to gather comprehensive information about the user's legal situation by asking follow-up questions.
Based on the conversation so far, ask a relevant follow-up question to better understand their case.
Be professional, empathetic, and concise. Ask one focused question at a time.
After gathering enough information (typically 3-5 exchanges), you should start wrapping up and offer to summarize.";

const SHOULD_END_SYSTEM: &str = "You are analyzing a legal consultation conversation to determine if enough information has been gathered.
Review the conversation and determine if:
1. The user has provided sufficient details about their legal matter
2. Key questions have been asked and answered
3. It's appropriate to wrap up and summarize

Respond with ONLY \"YES\" if the conversation should end, or \"NO\" if more questions are needed.";

/// Assistant backed by `/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    client: Client,
    api_url: String,
    model: String,
    api_key: SecretString,
}

impl OpenAiAssistant {
    pub fn new(api_key: SecretString, model: &str, api_url: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    async fn complete(
        &self,
        messages: Vec<WireMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        debug!(model = %self.model, messages = payload.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "empty or missing content".to_string(),
            })
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn first_prompt(&self, user_name: &str) -> String {
        let messages = vec![
            WireMessage::system(FIRST_PROMPT_SYSTEM),
            WireMessage::user(format!(
                "The user's name is {user_name}. Generate a welcoming first question to start gathering information about their legal matter."
            )),
        ];
        match self.complete(messages, 0.7, 200).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "OpenAI first prompt failed");
                FallbackAssistant::greeting(user_name)
            }
        }
    }

    async fn next_prompt(&self, history: &[HistoryEntry], latest: &str) -> String {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(WireMessage::system(NEXT_PROMPT_SYSTEM));
        messages.extend(history.iter().map(WireMessage::from));
        messages.push(WireMessage::user(latest));

        match self.complete(messages, 0.7, 250).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "OpenAI next prompt failed");
                FallbackAssistant::follow_up(history.len()).to_string()
            }
        }
    }

    async fn should_end(&self, history: &[HistoryEntry]) -> bool {
        let transcript = render_transcript(history);
        let messages = vec![
            WireMessage::system(SHOULD_END_SYSTEM),
            WireMessage::user(format!(
                "Conversation:\n{transcript}\n\nShould this conversation end? (YES/NO)"
            )),
        ];
        match self.complete(messages, 0.3, 10).await {
            Ok(answer) => answer.trim().eq_ignore_ascii_case("YES"),
            Err(e) => {
                error!(error = %e, "OpenAI end check failed");
                FallbackAssistant::ends_at(history.len())
            }
        }
    }
}

/// `ROLE: content` lines for the end check.
fn render_transcript(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Private wire types ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl WireMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

impl From<&HistoryEntry> for WireMessage {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            role: entry.role.as_str(),
            content: entry.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
