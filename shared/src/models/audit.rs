//! Append-only audit trail of privileged actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    StockCorrection,
    OrderValidated,
    OrderCancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::StockCorrection => "STOCK_CORRECTION",
            AuditAction::OrderValidated => "ORDER_VALIDATED",
            AuditAction::OrderCancelled => "ORDER_CANCELLED",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOCK_CORRECTION" => Ok(AuditAction::StockCorrection),
            "ORDER_VALIDATED" => Ok(AuditAction::OrderValidated),
            "ORDER_CANCELLED" => Ok(AuditAction::OrderCancelled),
            other => Err(format!("unknown audit action '{}'", other)),
        }
    }
}

/// Where a privileged request came from
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestProvenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Immutable record of a privileged action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: AuditAction,
    /// Serialized detail payload
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
