//! Canned prompts used when no model is available.

use async_trait::async_trait;

use super::{Assistant, HistoryEntry};

/// Transcript length at which the fallback wraps up a session.
pub(crate) const FALLBACK_END_AFTER: usize = 8;

/// Deterministic stand-in for the generative assistant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackAssistant;

impl FallbackAssistant {
    pub(crate) fn greeting(user_name: &str) -> String {
        format!(
            "Hello {user_name}! I'm here to help you with your legal question. What type of legal matter do you need assistance with today?"
        )
    }

    /// Staged follow-up keyed on how many messages the transcript holds.
    pub(crate) fn follow_up(message_count: usize) -> &'static str {
        match message_count {
            0..=2 => {
                "Could you provide more details about your situation? For example, when did this issue start?"
            }
            3..=4 => {
                "Have you taken any steps to address this matter already? If so, what have you tried?"
            }
            5..=6 => "Is there anything else you'd like to add that might be relevant to your case?",
            _ => {
                "Thank you for providing all this information. Based on what you've shared, I'll prepare a summary of your situation. Is there anything else you'd like to clarify?"
            }
        }
    }

    pub(crate) fn ends_at(message_count: usize) -> bool {
        message_count >= FALLBACK_END_AFTER
    }
}

#[async_trait]
impl Assistant for FallbackAssistant {
    async fn first_prompt(&self, user_name: &str) -> String {
        Self::greeting(user_name)
    }

    async fn next_prompt(&self, history: &[HistoryEntry], _latest: &str) -> String {
        Self::follow_up(history.len()).to_string()
    }

    async fn should_end(&self, history: &[HistoryEntry]) -> bool {
        Self::ends_at(history.len())
    }
}
