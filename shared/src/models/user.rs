//! Actors and roles of the back office

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session role supplied by the authentication provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Publisher / CEO, the only operator allowed to validate orders and correct stock
    Pdg,
    Author,
    Designer,
    Representative,
    Partner,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pdg => "PDG",
            Role::Author => "AUTHOR",
            Role::Designer => "DESIGNER",
            Role::Representative => "REPRESENTATIVE",
            Role::Partner => "PARTNER",
            Role::Client => "CLIENT",
        }
    }

    /// Publisher/operator capability: transitions, corrections, allocations
    pub fn is_operator(&self) -> bool {
        matches!(self, Role::Pdg)
    }

    /// Roles allowed to place an order on someone's behalf or for themselves
    pub fn can_create_orders(&self) -> bool {
        matches!(
            self,
            Role::Pdg | Role::Representative | Role::Designer | Role::Client | Role::Partner
        )
    }

    /// Partner restocks and partner-fulfilled sales are opened by representatives
    pub fn can_create_partner_orders(&self) -> bool {
        matches!(self, Role::Pdg | Role::Representative)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PDG" => Ok(Role::Pdg),
            "AUTHOR" => Ok(Role::Author),
            "DESIGNER" => Ok(Role::Designer),
            "REPRESENTATIVE" => Ok(Role::Representative),
            "PARTNER" => Ok(Role::Partner),
            "CLIENT" => Ok(Role::Client),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Identity of whoever performs an operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Contact details of the client a notification chain targets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientContact {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}
