//! Scheduled payment reminders for deposit orders

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ClientContact;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Confirmation,
    Reminder,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Confirmation => "CONFIRMATION",
            NotificationType::Reminder => "REMINDER",
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMATION" => Ok(NotificationType::Confirmation),
            "REMINDER" => Ok(NotificationType::Reminder),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

/// Activation status; only active chains are ever delivered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainStatus {
    #[serde(rename = "Actif")]
    Active,
    #[serde(rename = "Désactivé")]
    Inactive,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Active => "Actif",
            ChainStatus::Inactive => "Désactivé",
        }
    }
}

impl std::str::FromStr for ChainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Actif" => Ok(ChainStatus::Active),
            "Désactivé" => Ok(ChainStatus::Inactive),
            other => Err(format!("unknown chain status '{}'", other)),
        }
    }
}

/// A scheduled reminder tied to one order and one client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationChain {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub scheduled_date: DateTime<Utc>,
    pub send_sms: bool,
    pub send_email: bool,
    pub notification_type: NotificationType,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub status: ChainStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl NotificationChain {
    /// Due-set membership at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_sent
            && self.status == ChainStatus::Active
            && self.scheduled_date <= now
            && (self.send_sms || self.send_email)
    }
}

/// Order fields a reminder text needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainOrderSummary {
    pub id: Uuid,
    pub reference: String,
    pub total: Decimal,
    pub payment_due_date: Option<DateTime<Utc>>,
}

/// A due chain joined with its client and order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DueChain {
    pub chain: NotificationChain,
    pub client: Option<ClientContact>,
    pub order: Option<ChainOrderSummary>,
}

/// One failed chain in a scheduler run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainFailure {
    pub chain_id: Uuid,
    pub error: String,
}

/// Outcome of one scheduler run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<ChainFailure>,
}
