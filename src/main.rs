use std::sync::Arc;

use legal_intake::admin::seed_users;
use legal_intake::assistant::create_assistant;
use legal_intake::auth::TokenIssuer;
use legal_intake::config::AppConfig;
use legal_intake::error::{Error, Result};
use legal_intake::flow::{FlowDefinition, FlowEngine};
use legal_intake::mail::{LogMailer, Mailer, SmtpMailer};
use legal_intake::server::{AppState, build_router};
use legal_intake::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| Error::Tls("Failed to install rustls crypto provider".to_string()))?;

    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Failed to load .env file: {e}"),
    }

    let config = AppConfig::from_env()?;

    eprintln!("⚖️  Legal Intake v{}", env!("CARGO_PKG_VERSION"));

    // ── Flow definition ──────────────────────────────────────────────
    // Loaded before the listener binds; a missing or broken file is fatal.
    let candidates = match &config.flow_path {
        Some(path) => vec![path.clone()],
        None => FlowDefinition::default_candidates(),
    };
    let definition = FlowDefinition::load(&candidates)?;
    eprintln!(
        "   Flow: {} questions from {}",
        definition.len(),
        definition
            .source()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );
    let flow = Arc::new(FlowEngine::new(Arc::new(definition)));

    // ── Database ─────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    eprintln!("   Database: {}", config.db_path.display());

    if let Some(raw) = &config.seed_users {
        seed_users(db.as_ref(), raw).await?;
    }

    // ── Services ─────────────────────────────────────────────────────
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            eprintln!("   Email: {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(smtp.clone()))
        }
        None => {
            tracing::warn!("EMAIL_HOST not set, login links will be logged instead of sent");
            Arc::new(LogMailer)
        }
    };
    let tokens = Arc::new(TokenIssuer::new(&config.jwt_secret)?);
    let assistant = create_assistant(&config.assistant);

    let state = AppState {
        db,
        flow,
        assistant,
        tokens,
        mailer,
        frontend_url: config.frontend_url.clone(),
    };
    let app = build_router(state, &config.cors_origins());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    eprintln!("   API: http://0.0.0.0:{}/api\n", config.port);
    tracing::info!(port = config.port, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
