//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::conversation::model::{
    Conversation, ConversationMessage, ConversationMode, ConversationStatus, Role,
};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, User, UserUpdate};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    // Held so the database outlives `conn`; never read.
    _db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            _db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<i64>` to libsql Value.
fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map an insert/update failure, surfacing unique violations as `Constraint`.
fn write_error(context: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint("A user with this email already exists".to_string())
    } else {
        DatabaseError::Query(format!("{context}: {msg}"))
    }
}

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let created_str: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, DatabaseError> {
    let status_str: String = row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let mode_str: String = row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let created_str: String = row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let updated_str: String = row.get(6).map_err(|e| DatabaseError::Query(e.to_string()))?;

    Ok(Conversation {
        id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
        user_id: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
        status: status_str.parse().map_err(DatabaseError::Query)?,
        mode: mode_str.parse().map_err(DatabaseError::Query)?,
        current_question_id: row.get::<i64>(4).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_message(row: &libsql::Row) -> Result<ConversationMessage, DatabaseError> {
    let role_str: String = row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let created_str: String = row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?;
    Ok(ConversationMessage {
        id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
        conversation_id: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
        role: role_str.parse().map_err(DatabaseError::Query)?,
        content: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str = "id, email, name, created_at";

const CONVERSATION_COLUMNS: &str =
    "id, user_id, status, mode, current_question_id, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";

impl LibSqlBackend {
    async fn query_user(
        &self,
        sql: &str,
        param: libsql::Value,
    ) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params![param])
            .await
            .map_err(|e| DatabaseError::Query(format!("query user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("read user: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("query user: {e}"))),
        }
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn create_user(&self, email: &str, name: &str) -> Result<User, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO users (email, name, created_at) VALUES (?1, ?2, ?3)
                     RETURNING {USER_COLUMNS}"
                ),
                params![email, name, now],
            )
            .await
            .map_err(|e| write_error("create_user", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| write_error("create_user", e))?
            .ok_or_else(|| DatabaseError::Query("create_user: no row returned".to_string()))?;
        row_to_user(&row).map_err(|e| DatabaseError::Query(format!("create_user: {e}")))
    }

    async fn upsert_user(&self, email: &str, name: &str) -> Result<User, DatabaseError> {
        if let Some(existing) = self.get_user_by_email(email).await? {
            return Ok(existing);
        }
        self.create_user(email, name).await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        self.query_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            libsql::Value::Integer(id),
        )
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.query_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            libsql::Value::Text(email.to_string()),
        )
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users: {e}")))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users: {e}")))?
        {
            users.push(
                row_to_user(&row).map_err(|e| DatabaseError::Query(format!("read user: {e}")))?,
            );
        }
        Ok(users)
    }

    async fn update_user(
        &self,
        id: i64,
        update: &UserUpdate,
    ) -> Result<Option<User>, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE users SET email = COALESCE(?2, email), name = COALESCE(?3, name)
                 WHERE id = ?1",
                params![id, opt_text(update.email.as_deref()), opt_text(update.name.as_deref())],
            )
            .await
            .map_err(|e| write_error("update_user", e))?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_user: {e}")))?;
        Ok(affected > 0)
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn create_conversation(
        &self,
        user_id: i64,
        mode: ConversationMode,
        current_question_id: Option<i64>,
    ) -> Result<Conversation, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO conversations (user_id, status, mode, current_question_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                params![
                    user_id,
                    ConversationStatus::Active.as_str(),
                    mode.as_str(),
                    opt_int(current_question_id),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_conversation: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_conversation: {e}")))?
            .ok_or_else(|| {
                DatabaseError::Query("create_conversation: no row returned".to_string())
            })?;
        row_to_conversation(&row)
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_conversation(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_conversation: {e}"))),
        }
    }

    async fn update_conversation_status(
        &self,
        id: i64,
        status: ConversationStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE conversations SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_conversation_status: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "Conversation".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_current_question(
        &self,
        id: i64,
        question_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE conversations SET current_question_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, opt_int(question_id), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_current_question: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "Conversation".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<ConversationMessage, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO messages (conversation_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                params![conversation_id, role.as_str(), content, now.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_message: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("add_message: {e}")))?
            .ok_or_else(|| DatabaseError::Query("add_message: no row returned".to_string()))?;
        let message = row_to_message(&row)?;

        if let Err(e) = self
            .conn()
            .execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![conversation_id, now],
            )
            .await
        {
            tracing::warn!(conversation_id, "Failed to touch conversation updated_at: {e}");
        }

        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<ConversationMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 ORDER BY id ASC"
                ),
                params![conversation_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    // ── User tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get_user() {
        let db = test_db().await;
        let user = db.create_user("alice@example.com", "Alice").await.unwrap();
        assert!(user.id > 0);

        let by_id = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(by_id, user);

        let by_email = db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn get_user_not_found() {
        let db = test_db().await;
        assert!(db.get_user(42).await.unwrap().is_none());
        assert!(db.get_user_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_constraint_violation() {
        let db = test_db().await;
        db.create_user("dup@example.com", "First").await.unwrap();
        let err = db.create_user("dup@example.com", "Second").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let db = test_db().await;
        let first = db.upsert_user("seed@example.com", "Seed").await.unwrap();
        let second = db.upsert_user("seed@example.com", "Other").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Seed");
        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_users_newest_first() {
        let db = test_db().await;
        let a = db.create_user("a@example.com", "A").await.unwrap();
        let b = db.create_user("b@example.com", "B").await.unwrap();
        let users = db.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, b.id);
        assert_eq!(users[1].id, a.id);
    }

    #[tokio::test]
    async fn update_user_partial() {
        let db = test_db().await;
        let user = db.create_user("old@example.com", "Old").await.unwrap();

        let updated = db
            .update_user(
                user.id,
                &UserUpdate {
                    name: Some("New".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.email, "old@example.com");

        let missing = db
            .update_user(9999, &UserUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_user_cascades_conversations() {
        let db = test_db().await;
        let user = db.create_user("gone@example.com", "Gone").await.unwrap();
        let conv = db
            .create_conversation(user.id, ConversationMode::Scripted, Some(1))
            .await
            .unwrap();
        db.add_message(conv.id, Role::Assistant, "Hello").await.unwrap();

        assert!(db.delete_user(user.id).await.unwrap());
        assert!(!db.delete_user(user.id).await.unwrap());
        assert!(db.get_conversation(conv.id).await.unwrap().is_none());
        assert!(db.list_messages(conv.id).await.unwrap().is_empty());
    }

    // ── Conversation tests ──────────────────────────────────────────

    #[tokio::test]
    async fn conversation_crud() {
        let db = test_db().await;
        let user = db.create_user("c@example.com", "C").await.unwrap();

        let conv = db
            .create_conversation(user.id, ConversationMode::Scripted, Some(1))
            .await
            .unwrap();
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.mode, ConversationMode::Scripted);
        assert_eq!(conv.current_question_id, Some(1));

        db.set_current_question(conv.id, Some(5)).await.unwrap();
        db.update_conversation_status(conv.id, ConversationStatus::Completed)
            .await
            .unwrap();

        let loaded = db.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_question_id, Some(5));
        assert_eq!(loaded.status, ConversationStatus::Completed);
    }

    #[tokio::test]
    async fn assisted_conversation_has_no_question() {
        let db = test_db().await;
        let user = db.create_user("d@example.com", "D").await.unwrap();
        let conv = db
            .create_conversation(user.id, ConversationMode::Assisted, None)
            .await
            .unwrap();
        let loaded = db.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_question_id, None);
        assert_eq!(loaded.mode, ConversationMode::Assisted);
    }

    #[tokio::test]
    async fn update_missing_conversation_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_conversation_status(404, ConversationStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn messages_are_ordered_oldest_first() {
        let db = test_db().await;
        let user = db.create_user("e@example.com", "E").await.unwrap();
        let conv = db
            .create_conversation(user.id, ConversationMode::Scripted, Some(1))
            .await
            .unwrap();

        db.add_message(conv.id, Role::Assistant, "Question").await.unwrap();
        db.add_message(conv.id, Role::User, "Answer").await.unwrap();
        db.add_message(conv.id, Role::Assistant, "Next").await.unwrap();

        let messages = db.list_messages(conv.id).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, "Question");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].content, "Next");
    }

    #[tokio::test]
    async fn unreadable_message_row_fails_the_whole_transcript() {
        let db = test_db().await;
        let user = db.create_user("f@example.com", "F").await.unwrap();
        let conv = db
            .create_conversation(user.id, ConversationMode::Assisted, None)
            .await
            .unwrap();
        db.add_message(conv.id, Role::Assistant, "Question").await.unwrap();
        db.conn()
            .execute(
                "INSERT INTO messages (conversation_id, role, content, created_at)
                 VALUES (?1, 'narrator', 'aside', '2024-01-01T00:00:00Z')",
                params![conv.id],
            )
            .await
            .unwrap();
        db.add_message(conv.id, Role::User, "Answer").await.unwrap();

        let err = db.list_messages(conv.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn unreadable_user_row_fails_the_listing() {
        let db = test_db().await;
        db.create_user("g@example.com", "G").await.unwrap();
        db.conn()
            .execute(
                "INSERT INTO users (email, name, created_at) VALUES ('h@example.com', 'H', X'00')",
                (),
            )
            .await
            .unwrap();

        let err = db.list_users().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn adding_a_message_touches_the_conversation() {
        let db = test_db().await;
        let user = db.create_user("i@example.com", "I").await.unwrap();
        let conv = db
            .create_conversation(user.id, ConversationMode::Scripted, Some(1))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        db.add_message(conv.id, Role::User, "Answer").await.unwrap();

        let updated = db.get_conversation(conv.id).await.unwrap().unwrap();
        assert!(updated.updated_at > conv.updated_at);
    }

    #[tokio::test]
    async fn open_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("intake.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(path.exists());
        db.create_user("f@example.com", "F").await.unwrap();
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        db.init_schema().await.unwrap();
    }
}
