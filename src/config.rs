//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::assistant::AssistantConfig;
use crate::error::ConfigError;
use crate::mail::SmtpConfig;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DB_PATH: &str = "./data/intake.db";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Base URL of the web client; used in login links and CORS.
    pub frontend_url: String,
    /// Extra origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Secret for signing login tokens.
    pub jwt_secret: SecretString,
    /// Explicit flow definition path. Default locations are searched when unset.
    pub flow_path: Option<PathBuf>,
    /// SMTP settings. `None` logs login links instead of sending them.
    pub smtp: Option<SmtpConfig>,
    pub assistant: AssistantConfig,
    /// Raw `email:Name,...` list of users to create at startup.
    pub seed_users: Option<String>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match non_empty_var("PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let jwt_secret = non_empty_var("JWT_SECRET")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;

        let frontend_url =
            non_empty_var("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());

        let allowed_origins = non_empty_var("INTAKE_ALLOWED_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let assistant = AssistantConfig {
            api_key: non_empty_var("OPENAI_API_KEY").map(SecretString::from),
            model: non_empty_var("OPENAI_MODEL")
                .unwrap_or_else(|| AssistantConfig::default().model),
            ..Default::default()
        };

        Ok(Self {
            port,
            db_path: non_empty_var("INTAKE_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            frontend_url,
            allowed_origins,
            jwt_secret,
            flow_path: non_empty_var("INTAKE_FLOW_PATH").map(PathBuf::from),
            smtp: smtp_from_env(),
            assistant,
            seed_users: non_empty_var("INTAKE_SEED_USERS"),
        })
    }

    /// Origins accepted by CORS: the frontend plus any extras.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins = vec![self.frontend_url.trim_end_matches('/').to_string()];
        for origin in &self.allowed_origins {
            if !origins.contains(origin) {
                origins.push(origin.clone());
            }
        }
        origins
    }
}

/// Returns `None` if `EMAIL_HOST` is not set (mail disabled).
fn smtp_from_env() -> Option<SmtpConfig> {
    let host = non_empty_var("EMAIL_HOST")?;
    let port: u16 = std::env::var("EMAIL_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(587);
    let username = std::env::var("EMAIL_USER").unwrap_or_default();
    let password = SecretString::from(std::env::var("EMAIL_PASS").unwrap_or_default());
    let from_address = non_empty_var("EMAIL_FROM").unwrap_or_else(|| username.clone());

    Some(SmtpConfig {
        host,
        port,
        username,
        password,
        from_address,
    })
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
