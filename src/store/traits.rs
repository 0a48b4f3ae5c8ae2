//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conversation::model::{
    Conversation, ConversationMessage, ConversationMode, ConversationStatus, Role,
};
use crate::error::DatabaseError;

/// An authorized user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update for a user. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Backend-agnostic database trait covering users, conversations and
/// transcript messages.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a user. Fails with `Constraint` if the email is taken.
    async fn create_user(&self, email: &str, name: &str) -> Result<User, DatabaseError>;

    /// Insert a user unless one with the same email exists.
    async fn upsert_user(&self, email: &str, name: &str) -> Result<User, DatabaseError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// All users, newest first.
    async fn list_users(&self) -> Result<Vec<User>, DatabaseError>;

    /// Apply a partial update. Returns `None` if the user does not exist.
    async fn update_user(
        &self,
        id: i64,
        update: &UserUpdate,
    ) -> Result<Option<User>, DatabaseError>;

    /// Delete a user and their conversations. Returns whether a row was removed.
    async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    async fn create_conversation(
        &self,
        user_id: i64,
        mode: ConversationMode,
        current_question_id: Option<i64>,
    ) -> Result<Conversation, DatabaseError>;

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, DatabaseError>;

    async fn update_conversation_status(
        &self,
        id: i64,
        status: ConversationStatus,
    ) -> Result<(), DatabaseError>;

    async fn set_current_question(
        &self,
        id: i64,
        question_id: Option<i64>,
    ) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Append a transcript entry.
    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<ConversationMessage, DatabaseError>;

    /// Transcript ordered oldest first.
    async fn list_messages(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<ConversationMessage>, DatabaseError>;
}
