//! Outbound mail: magic-link delivery over SMTP via lettre.

use async_trait::async_trait;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::MailError;

/// SMTP settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Delivers rendered email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Sends through an SMTP relay with STARTTLS.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_blocking(config: &SmtpConfig, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(config.from_address.parse().map_err(|e| MailError::InvalidAddress {
                address: config.from_address.clone(),
                reason: format!("{e}"),
            })?)
            .to(email.to.parse().map_err(|e| MailError::InvalidAddress {
                address: email.to.clone(),
                reason: format!("{e}"),
            })?)
            .subject(&email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        transport
            .send(&message)
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let config = self.config.clone();
        let to = email.to.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &email))
            .await
            .map_err(|e| MailError::Transport(format!("mail task failed: {e}")))??;
        tracing::info!(to = %to, "Email sent");
        Ok(())
    }
}

/// Logs mail instead of sending it. Used when SMTP is not configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::warn!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, email not sent:\n{}",
            email.text
        );
        Ok(())
    }
}

/// Languages the login email is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Fr,
    Nl,
}

impl Language {
    /// Unknown codes fall back to English.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "fr" => Self::Fr,
            "nl" => Self::Nl,
            _ => Self::En,
        }
    }
}

struct MagicLinkCopy {
    subject: &'static str,
    greeting: &'static str,
    body: &'static str,
    button: &'static str,
    alternative: &'static str,
    footer: &'static str,
}

fn copy_for(language: Language) -> MagicLinkCopy {
    match language {
        Language::En => MagicLinkCopy {
            subject: "Your EASYLEGAL Login Link",
            greeting: "Hello",
            body: "Click the button below to securely log in to EASYLEGAL. This link will expire in 15 minutes.",
            button: "Login to EASYLEGAL",
            alternative: "Or copy and paste this link:",
            footer: "If you did not request this email, please ignore it.",
        },
        Language::Fr => MagicLinkCopy {
            subject: "Votre lien de connexion EASYLEGAL",
            greeting: "Bonjour",
            body: "Cliquez sur le bouton ci-dessous pour vous connecter en toute sécurité à EASYLEGAL. Ce lien expirera dans 15 minutes.",
            button: "Se connecter à EASYLEGAL",
            alternative: "Ou copiez et collez ce lien :",
            footer: "Si vous n'avez pas demandé cet email, veuillez l'ignorer.",
        },
        Language::Nl => MagicLinkCopy {
            subject: "Uw EASYLEGAL inloglink",
            greeting: "Hallo",
            body: "Klik op de knop hieronder om veilig in te loggen op EASYLEGAL. Deze link verloopt over 15 minuten.",
            button: "Inloggen op EASYLEGAL",
            alternative: "Of kopieer en plak deze link:",
            footer: "Als u deze e-mail niet hebt aangevraagd, negeer deze dan.",
        },
    }
}

/// Render the login email for `to`.
pub fn magic_link_email(language: Language, to: &str, name: &str, link: &str) -> OutgoingEmail {
    let copy = copy_for(language);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{subject}</title>
</head>
<body style="margin: 0; padding: 40px 20px; font-family: Arial, sans-serif; background-color: #f8f9fa;">
  <div style="max-width: 600px; margin: 0 auto; background-color: #ffffff; border-radius: 8px; padding: 40px;">
    <h1 style="margin: 0 0 24px 0; color: #2684ff; text-align: center;">EASYLEGAL</h1>
    <h2 style="margin: 0 0 16px 0; color: #212529;">{greeting} {name},</h2>
    <p style="color: #6c757d; line-height: 1.6;">{body}</p>
    <p style="text-align: center; padding: 20px 0;">
      <a href="{link}" style="display: inline-block; background-color: #2684ff; color: #ffffff; text-decoration: none; padding: 14px 32px; border-radius: 6px;">{button}</a>
    </p>
    <p style="color: #adb5bd; font-size: 14px;">{alternative}<br><a href="{link}" style="color: #2684ff; word-break: break-all;">{link}</a></p>
    <p style="color: #adb5bd; font-size: 14px; text-align: center; border-top: 1px solid #e9ecef; padding-top: 20px;">{footer}</p>
  </div>
</body>
</html>"#,
        subject = copy.subject,
        greeting = copy.greeting,
        name = name,
        body = copy.body,
        link = link,
        button = copy.button,
        alternative = copy.alternative,
        footer = copy.footer,
    );

    let text = format!(
        "{greeting} {name},\n\n{body}\n\n{link}\n\n{footer}\n",
        greeting = copy.greeting,
        body = copy.body,
        footer = copy.footer,
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: copy.subject.to_string(),
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes() {
        assert_eq!(Language::from_code("fr"), Language::Fr);
        assert_eq!(Language::from_code(" NL "), Language::Nl);
        assert_eq!(Language::from_code("de"), Language::En);
        assert_eq!(Language::from_code(""), Language::En);
    }

    #[test]
    fn english_email_contains_link_and_name() {
        let link = "http://localhost:5173/auth/verify?token=abc";
        let email = magic_link_email(Language::En, "jane@example.com", "Jane", link);
        assert_eq!(email.subject, "Your EASYLEGAL Login Link");
        assert_eq!(email.to, "jane@example.com");
        assert!(email.html.contains("Hello Jane,"));
        assert!(email.html.contains(link));
        assert!(email.text.contains(link));
    }

    #[test]
    fn localized_subjects() {
        let fr = magic_link_email(Language::Fr, "a@b.com", "A", "x");
        assert_eq!(fr.subject, "Votre lien de connexion EASYLEGAL");
        assert!(fr.text.starts_with("Bonjour A,"));

        let nl = magic_link_email(Language::Nl, "a@b.com", "A", "x");
        assert_eq!(nl.subject, "Uw EASYLEGAL inloglink");
        assert!(nl.html.contains("Inloggen op EASYLEGAL"));
    }

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let email = magic_link_email(Language::En, "a@b.com", "A", "x");
        LogMailer.send(email).await.unwrap();
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_recipient() {
        let mailer = SmtpMailer::new(SmtpConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            username: "user".to_string(),
            password: SecretString::from("pass".to_string()),
            from_address: "noreply@example.com".to_string(),
        });
        let mut email = magic_link_email(Language::En, "a@b.com", "A", "x");
        email.to = "not an address".to_string();
        let err = mailer.send(email).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
    }
}
