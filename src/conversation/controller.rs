//! Session controller: runs a conversation turn by turn.
//!
//! Scripted sessions are routed by the [`FlowEngine`]; assisted sessions by
//! the [`Assistant`]. Every prompt and answer lands in the transcript.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::model::{
    Conversation, ConversationMessage, ConversationMode, ConversationStatus, Role,
};
use crate::assistant::{Assistant, HistoryEntry};
use crate::error::SessionError;
use crate::flow::FlowEngine;
use crate::store::Database;

/// Longest answer accepted in a single turn, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedConversation {
    pub conversation_id: i64,
    pub question: String,
    pub message_id: i64,
    pub mode: ConversationMode,
}

/// Result of one submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub question: String,
    pub message_id: i64,
    pub completed: bool,
}

/// Public view of the session owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// A conversation with its full transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<ConversationMessage>,
    pub user: Option<UserSummary>,
}

/// Drives conversations against the store.
pub struct SessionController {
    db: Arc<dyn Database>,
    flow: Arc<FlowEngine>,
    assistant: Arc<dyn Assistant>,
}

impl SessionController {
    pub fn new(db: Arc<dyn Database>, flow: Arc<FlowEngine>, assistant: Arc<dyn Assistant>) -> Self {
        Self {
            db,
            flow,
            assistant,
        }
    }

    /// Open a session for `user_id` and record its first prompt.
    pub async fn start(
        &self,
        user_id: i64,
        mode: ConversationMode,
    ) -> Result<StartedConversation, SessionError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(SessionError::UserNotFound(user_id))?;

        let (question, current_question_id) = match mode {
            ConversationMode::Scripted => {
                let start = self.flow.resolve_start(&user.name)?;
                (start.text, Some(start.question_id))
            }
            ConversationMode::Assisted => (self.assistant.first_prompt(&user.name).await, None),
        };

        let conversation = self
            .db
            .create_conversation(user.id, mode, current_question_id)
            .await?;
        let message = self
            .db
            .add_message(conversation.id, Role::Assistant, &question)
            .await?;

        info!(
            conversation_id = conversation.id,
            user_id = user.id,
            mode = %mode,
            "Conversation started"
        );

        Ok(StartedConversation {
            conversation_id: conversation.id,
            question,
            message_id: message.id,
            mode,
        })
    }

    /// Record `answer` and produce the next prompt.
    pub async fn submit_turn(
        &self,
        conversation_id: i64,
        answer: &str,
    ) -> Result<TurnOutcome, SessionError> {
        validate_answer(answer)?;

        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .ok_or(SessionError::ConversationNotFound(conversation_id))?;

        if !conversation.is_active() {
            return Err(SessionError::NotActive(conversation_id));
        }

        // Transcript before this answer; assisted prompts are built from it.
        let prior = self.db.list_messages(conversation_id).await?;
        self.db
            .add_message(conversation_id, Role::User, answer)
            .await?;

        let (question, completed, next_question_id) = match conversation.mode {
            ConversationMode::Scripted => {
                let current = conversation
                    .current_question_id
                    .ok_or(SessionError::MissingCurrentQuestion(conversation_id))?;
                let next = self.flow.resolve_next(current, answer)?;
                debug!(
                    conversation_id,
                    from = current,
                    to = %next.target,
                    "Scripted route resolved"
                );
                let next_id = next.question_id();
                (next.text, next.is_terminal, next_id)
            }
            ConversationMode::Assisted => {
                let history: Vec<HistoryEntry> = prior
                    .iter()
                    .map(|m| HistoryEntry::new(m.role, m.content.clone()))
                    .collect();
                let should_end = self.assistant.should_end(&history).await;
                let question = self.assistant.next_prompt(&history, answer).await;
                (question, should_end, None)
            }
        };

        if completed {
            self.db
                .update_conversation_status(conversation_id, ConversationStatus::Completed)
                .await?;
            info!(conversation_id, "Conversation completed");
        } else if let Some(next_id) = next_question_id {
            self.db
                .set_current_question(conversation_id, Some(next_id))
                .await?;
        }

        let message = self
            .db
            .add_message(conversation_id, Role::Assistant, &question)
            .await?;

        Ok(TurnOutcome {
            question,
            message_id: message.id,
            completed,
        })
    }

    /// Load a conversation with its transcript and owner.
    pub async fn get(&self, conversation_id: i64) -> Result<ConversationView, SessionError> {
        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .ok_or(SessionError::ConversationNotFound(conversation_id))?;
        let messages = self.db.list_messages(conversation_id).await?;
        let user = self
            .db
            .get_user(conversation.user_id)
            .await?
            .map(|u| UserSummary {
                id: u.id,
                name: u.name,
                email: u.email,
            });

        Ok(ConversationView {
            conversation,
            messages,
            user,
        })
    }
}

fn validate_answer(answer: &str) -> Result<(), SessionError> {
    if answer.is_empty() {
        return Err(SessionError::InvalidMessage(
            "Message must not be empty".to_string(),
        ));
    }
    if answer.chars().count() > MAX_MESSAGE_CHARS {
        return Err(SessionError::InvalidMessage(format!(
            "Message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}
