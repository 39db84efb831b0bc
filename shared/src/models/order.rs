//! Sales orders and their lifecycle

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Validated,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Validated,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Validated => "VALIDATED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Legal-transition table. Terminal states have no entry.
    pub fn legal_targets(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Validated, OrderStatus::Cancelled],
            OrderStatus::Validated => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Cancelled],
            OrderStatus::Shipped => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.legal_targets().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.legal_targets().is_empty()
    }

    /// Stock is reserved from validation until delivery or cancellation
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            OrderStatus::Validated | OrderStatus::Processing | OrderStatus::Shipped
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "VALIDATED" => Ok(OrderStatus::Validated),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// Where the copies of an order come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderChannel {
    /// Sold to a client out of publisher stock
    Retail,
    /// Publisher stock shipped into a partner's consignment
    PartnerRestock { partner_id: Uuid },
    /// Sold to a client out of a partner's consignment
    PartnerRetail { partner_id: Uuid },
}

impl OrderChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderChannel::Retail => "retail",
            OrderChannel::PartnerRestock { .. } => "partner_restock",
            OrderChannel::PartnerRetail { .. } => "partner_retail",
        }
    }

    pub fn partner_id(&self) -> Option<Uuid> {
        match self {
            OrderChannel::Retail => None,
            OrderChannel::PartnerRestock { partner_id }
            | OrderChannel::PartnerRetail { partner_id } => Some(*partner_id),
        }
    }

    /// Rebuild from the stored `(channel, partner_id)` columns
    pub fn from_parts(kind: &str, partner_id: Option<Uuid>) -> Result<Self, String> {
        match (kind, partner_id) {
            ("retail", _) => Ok(OrderChannel::Retail),
            ("partner_restock", Some(partner_id)) => Ok(OrderChannel::PartnerRestock { partner_id }),
            ("partner_retail", Some(partner_id)) => Ok(OrderChannel::PartnerRetail { partner_id }),
            (kind, None) if kind.starts_with("partner_") => {
                Err(format!("channel '{}' requires a partner", kind))
            }
            (other, _) => Err(format!("unknown order channel '{}'", other)),
        }
    }
}

/// Immediate payment or deferred ("depot") payment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Immediate,
    Depot,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Immediate => "immediate",
            PaymentMethod::Depot => "depot",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(PaymentMethod::Immediate),
            "depot" => Ok(PaymentMethod::Depot),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PAID" => Ok(PaymentStatus::Paid),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// One line of an order; `unit_price` is the price at order time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub work_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A sale transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub created_by: Uuid,
    pub channel: OrderChannel,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_due_date: Option<DateTime<Utc>>,
    pub remaining_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Always recomputed from the items, never read from a stored total
    pub fn total(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item_count(&self) -> i64 {
        self.items
            .iter()
            .fold(0i64, |count, item| count.saturating_add(item.quantity))
    }

    /// Short human reference used in ledger entries and SMS texts
    pub fn reference(&self) -> String {
        order_reference(self.id)
    }
}

/// Human-facing order reference: `CMD-` and the last 8 hex digits of the id
pub fn order_reference(id: Uuid) -> String {
    let id = id.simple().to_string();
    format!("CMD-{}", &id[id.len() - 8..].to_uppercase())
}
