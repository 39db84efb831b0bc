//! Transactional e-mail client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailMessage {
    /// Plain-text body with an HTML twin where line breaks become `<br>`
    pub fn from_text(to: &str, subject: &str, text: &str) -> Self {
        let escaped = text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
            html: format!("<p>{}</p>", escaped.replace('\n', "<br>")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl EmailOutcome {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn failure_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "Erreur SMTP".to_string())
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> AppResult<EmailOutcome>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP e-mail API client
#[derive(Clone)]
pub struct HttpEmailClient {
    client: Client,
    config: EmailConfig,
}

impl HttpEmailClient {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailClient {
    async fn send(&self, email: &EmailMessage) -> AppResult<EmailOutcome> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::warn!("E-mail API key is not configured");
            return Ok(EmailOutcome::failed("Configuration manquante"));
        };

        let request = SendRequest {
            from: &self.config.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = match self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "E-mail request failed");
                return Ok(EmailOutcome::failed(e.to_string()));
            }
        };

        if response.status().is_success() {
            tracing::info!(subject = %email.subject, "E-mail sent");
            return Ok(EmailOutcome::sent());
        }

        let status = response.status();
        let reply: Option<ErrorReply> = response.json().await.ok();
        let message = reply
            .and_then(|r| r.message)
            .unwrap_or_else(|| format!("HTTP {}", status));
        tracing::error!(status = %status, error = %message, "E-mail rejected");
        Ok(EmailOutcome::failed(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_keeps_line_breaks() {
        let email = EmailMessage::from_text("a@b.ga", "Rappel", "Ligne 1\nLigne <2>");
        assert_eq!(email.html, "<p>Ligne 1<br>Ligne &lt;2&gt;</p>");
        assert_eq!(email.text, "Ligne 1\nLigne <2>");
    }

    #[test]
    fn failure_without_detail_uses_generic_text() {
        let outcome = EmailOutcome {
            success: false,
            error: None,
        };
        assert_eq!(outcome.failure_message(), "Erreur SMTP");
    }
}
