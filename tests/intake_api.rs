//! Integration tests for the intake REST API.
//!
//! Each test spins up an Axum server on a random port backed by an in-memory
//! database and the bundled flow, then drives the real HTTP contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use legal_intake::assistant::FallbackAssistant;
use legal_intake::auth::TokenIssuer;
use legal_intake::conversation::ConversationMode;
use legal_intake::error::MailError;
use legal_intake::flow::{END_OF_FLOW_MESSAGE, FlowDefinition, FlowEngine};
use legal_intake::mail::{Mailer, OutgoingEmail};
use legal_intake::server::{AppState, build_router};
use legal_intake::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Mailer that keeps every message in memory.
#[derive(Default)]
struct CapturingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

struct TestServer {
    base: String,
    db: Arc<dyn Database>,
    mailer: Arc<CapturingMailer>,
    client: reqwest::Client,
}

/// Start an Axum server on a random port.
async fn start_server() -> TestServer {
    let definition = FlowDefinition::load(&FlowDefinition::default_candidates()).unwrap();
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let mailer = Arc::new(CapturingMailer::default());

    let state = AppState {
        db: Arc::clone(&db),
        flow: Arc::new(FlowEngine::new(Arc::new(definition))),
        assistant: Arc::new(FallbackAssistant),
        tokens: Arc::new(
            TokenIssuer::new(&SecretString::from("integration-secret".to_string())).unwrap(),
        ),
        mailer: mailer.clone(),
        frontend_url: "http://localhost:5173".to_string(),
    };
    let app = build_router(state, &["http://localhost:5173".to_string()]);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        db,
        mailer,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn seed_user(&self) -> i64 {
        self.db
            .create_user("jane@example.com", "Jane")
            .await
            .unwrap()
            .id
    }
}

// ── Conversations ───────────────────────────────────────────────────

#[tokio::test]
async fn scripted_contract_path_reaches_completion() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let user_id = server.seed_user().await;

        let (status, body) = server
            .post(
                "/api/conversation/start",
                json!({"userId": user_id, "mode": "manual"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["mode"], "manual");
        let question = body["data"]["question"].as_str().unwrap();
        assert!(question.starts_with("Hello Jane!"));
        let conversation_id = body["data"]["conversationId"].as_i64().unwrap();

        let answers = ["A", "a written contract", "it was breached", "last month", "a", "no"];
        for (i, answer) in answers.iter().enumerate() {
            let (status, body) = server
                .post(
                    "/api/conversation/message",
                    json!({"conversationId": conversation_id, "message": answer}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let completed = body["data"]["completed"].as_bool().unwrap();
            assert_eq!(completed, i == answers.len() - 1, "turn {i}");
            if completed {
                assert_eq!(body["data"]["question"], END_OF_FLOW_MESSAGE);
            }
        }

        let (status, body) = server
            .get(&format!("/api/conversation/{conversation_id}"))
            .await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["status"], "completed");
        assert_eq!(data["user"]["email"], "jane@example.com");

        let messages = data["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 13);
        for (i, message) in messages.iter().enumerate() {
            let expected = if i % 2 == 0 { "assistant" } else { "user" };
            assert_eq!(message["role"], expected);
        }
        assert_eq!(messages[1]["content"], "A");

        // Completed sessions reject further turns.
        let (status, body) = server
            .post(
                "/api/conversation/message",
                json!({"conversationId": conversation_id, "message": "hello?"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Conversation is not active");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn assisted_mode_is_default() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let user_id = server.seed_user().await;

        let (status, body) = server
            .post("/api/conversation/start", json!({"userId": user_id}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["mode"], "openai");
        assert!(
            body["data"]["question"]
                .as_str()
                .unwrap()
                .contains("What type of legal matter")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn conversation_error_cases() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let user_id = server.seed_user().await;

        let (status, _) = server
            .post("/api/conversation/start", json!({"userId": 9999}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = server
            .post(
                "/api/conversation/start",
                json!({"userId": user_id, "mode": "robot"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .post("/api/conversation/start", json!({"userId": "abc"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .post(
                "/api/conversation/message",
                json!({"conversationId": 4242, "message": "hi"}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = server
            .post(
                "/api/conversation/start",
                json!({"userId": user_id, "mode": "manual"}),
            )
            .await;
        let conversation_id = body["data"]["conversationId"].as_i64().unwrap();

        let (status, _) = server
            .post(
                "/api/conversation/message",
                json!({"conversationId": conversation_id, "message": ""}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .post(
                "/api/conversation/message",
                json!({"conversationId": conversation_id, "message": "x".repeat(5001)}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server.get("/api/conversation/not-a-number").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server.get("/api/conversation/777").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn scripted_session_on_unknown_question_is_internal_error() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let user_id = server.seed_user().await;
        let conversation = server
            .db
            .create_conversation(user_id, ConversationMode::Scripted, Some(999))
            .await
            .unwrap();

        let (status, body) = server
            .post(
                "/api/conversation/message",
                json!({"conversationId": conversation.id, "message": "a"}),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Internal server error");
    })
    .await
    .expect("test timed out");
}

// ── Admin ───────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_user_lifecycle() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let (status, body) = server
            .post(
                "/api/admin/users",
                json!({"email": "New@Example.com", "name": "  New User "}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["email"], "new@example.com");
        assert_eq!(body["data"]["name"], "New User");
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, _) = server
            .post(
                "/api/admin/users",
                json!({"email": "new@example.com", "name": "Dup"}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = server
            .post("/api/admin/users", json!({"email": "nope", "name": "X"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let resp = server
            .client
            .put(format!("{}/api/admin/users/{id}", server.base))
            .json(&json!({"name": "Renamed"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["name"], "Renamed");

        let resp = server
            .client
            .put(format!("{}/api/admin/users/{id}", server.base))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let (status, body) = server.get("/api/admin/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = server.get("/api/admin/users/xyz").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let url = format!("{}/api/admin/users/{id}", server.base);
        let resp = server.client.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = server.client.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn magic_link_login_flow() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        server.seed_user().await;

        let (status, _) = server
            .post("/api/auth/request-magic-link", json!({}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .post(
                "/api/auth/request-magic-link",
                json!({"email": "stranger@example.com"}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = server
            .post(
                "/api/auth/request-magic-link",
                json!({"email": "JANE@example.com", "language": "fr"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let email = server.mailer.sent.lock().unwrap().pop().unwrap();
        assert_eq!(email.to, "jane@example.com");
        assert_eq!(email.subject, "Votre lien de connexion EASYLEGAL");
        let marker = "http://localhost:5173/auth/verify?token=";
        let start = email.text.find(marker).unwrap() + marker.len();
        let token: String = email.text[start..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect();

        let (status, _) = server
            .post("/api/auth/verify-token", json!({"token": "garbage"}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = server
            .post("/api/auth/verify-token", json!({"token": token}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["name"], "Jane");
        let session = body["data"]["token"].as_str().unwrap().to_string();

        let resp = server
            .client
            .get(format!("{}/api/auth/verify-session", server.base))
            .bearer_auth(&session)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["user"]["email"], "jane@example.com");

        let resp = server
            .client
            .get(format!("{}/api/auth/verify-session", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Removing the user revokes magic links still in flight.
        let user = server
            .db
            .get_user_by_email("jane@example.com")
            .await
            .unwrap()
            .unwrap();
        server.db.delete_user(user.id).await.unwrap();
        let (status, _) = server
            .post("/api/auth/verify-token", json!({"token": token}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    })
    .await
    .expect("test timed out");
}
