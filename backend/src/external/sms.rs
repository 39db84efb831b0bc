//! SMS gateway client
//!
//! Integrates with the FasterMessage HTTP API. Gateway refusals and network
//! errors come back as an unsuccessful [`SmsResponse`], never as `Err`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{anonymize_phone, normalize_phone, NotificationType};

use crate::config::SmsConfig;
use crate::error::AppResult;

/// One outgoing text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub text: String,
}

/// `status` is a string on some gateway versions and a boolean on others
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SmsStatus {
    Flag(bool),
    Text(String),
}

/// Gateway reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsResponse {
    #[serde(default)]
    pub status: Option<SmsStatus>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "messageId")]
    pub message_id: Option<String>,
}

impl SmsResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(SmsStatus::Flag(false)),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn submitted(message_id: impl Into<String>) -> Self {
        Self {
            code: Some("SUBMITTED".to_string()),
            message_id: Some(message_id.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(&self.status, Some(SmsStatus::Flag(true)))
            || matches!(&self.status, Some(SmsStatus::Text(s)) if s == "success")
            || self.code.as_deref() == Some("SUBMITTED")
    }

    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Erreur API".to_string())
    }
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> AppResult<SmsResponse>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    username: &'a str,
    apikey: &'a str,
    password: &'a str,
    from: &'a str,
    to: &'a str,
    text: &'a str,
}

/// FasterMessage client
#[derive(Clone)]
pub struct FasterMessageClient {
    client: Client,
    config: SmsConfig,
}

impl FasterMessageClient {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SmsTransport for FasterMessageClient {
    async fn send(&self, message: &SmsMessage) -> AppResult<SmsResponse> {
        let (Some(username), Some(apikey), Some(password)) = (
            self.config.username.as_deref(),
            self.config.api_key.as_deref(),
            self.config.password.as_deref(),
        ) else {
            tracing::warn!("SMS gateway credentials are not configured");
            return Ok(SmsResponse::failed("Configuration manquante"));
        };

        let to = normalize_phone(&message.to);
        let masked = anonymize_phone(&to);
        if !to.starts_with('+') {
            tracing::warn!(phone = %masked, "Phone number has no country code");
        }

        let request = SendRequest {
            username,
            apikey,
            password,
            from: &self.config.sender,
            to: &to,
            text: &message.text,
        };

        let response = match self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(phone = %masked, error = %e, "SMS request failed");
                return Ok(SmsResponse::failed(e.to_string()));
            }
        };

        let http_status = response.status();
        let body: SmsResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(phone = %masked, error = %e, "Unreadable SMS gateway reply");
                return Ok(SmsResponse::failed(format!(
                    "Réponse illisible ({})",
                    http_status
                )));
            }
        };

        if http_status.is_success() && body.is_success() {
            tracing::info!(
                phone = %masked,
                message_id = body.message_id.as_deref().unwrap_or("N/A"),
                "SMS sent"
            );
            Ok(body)
        } else {
            tracing::error!(phone = %masked, status = %http_status, reply = ?body, "SMS rejected");
            Ok(SmsResponse {
                status: Some(SmsStatus::Flag(false)),
                ..body
            })
        }
    }
}

// ============================================================================
// Message texts
// ============================================================================

/// `1234567.5` -> `1 234 567,5`
pub fn format_amount_fr(amount: Decimal) -> String {
    let amount = amount.normalize();
    let text = amount.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{},{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// `dd/mm/yyyy`
pub fn format_date_fr(date: DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Text of a confirmation or payment-reminder SMS
pub fn chain_sms_text(
    kind: NotificationType,
    client_name: &str,
    amount: Decimal,
    order_reference: &str,
    due_date: DateTime<Utc>,
) -> String {
    let amount = format_amount_fr(amount);
    let date = format_date_fr(due_date);
    match kind {
        NotificationType::Confirmation => format!(
            "Bonjour {}, Laha Edition vous confirme la validation de votre commande {} d'un montant de {} F CFA. Échéance de paiement : {}. Merci !",
            client_name, order_reference, amount, date
        ),
        NotificationType::Reminder => format!(
            "Bonjour {}, Laha Edition vous rappelle que l'échéance de paiement des {} F CFA pour la commande {} arrive le {}. Merci de bien vouloir régulariser dans les délais.",
            client_name, amount, order_reference, date
        ),
    }
}
