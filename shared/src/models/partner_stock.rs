//! Per-partner consignment records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consignment of one work held by one partner.
///
/// Created on first allocation, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartnerStock {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub work_id: Uuid,
    /// Copies shipped to the partner
    pub allocated_quantity: i64,
    /// Copies the partner has sold
    pub sold_quantity: i64,
    /// Copies sent back to the publisher
    pub returned_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One of the three consignment counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PartnerCounter {
    Allocated,
    Sold,
    Returned,
}

impl PartnerCounter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerCounter::Allocated => "allocated",
            PartnerCounter::Sold => "sold",
            PartnerCounter::Returned => "returned",
        }
    }

    /// Publisher stock moved per copy counted here: allocations leave the
    /// warehouse, returns come back, partner sales do not touch it
    pub fn stock_factor(&self) -> i64 {
        match self {
            PartnerCounter::Allocated => -1,
            PartnerCounter::Sold => 0,
            PartnerCounter::Returned => 1,
        }
    }
}

impl std::str::FromStr for PartnerCounter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allocated" => Ok(PartnerCounter::Allocated),
            "sold" => Ok(PartnerCounter::Sold),
            "returned" => Ok(PartnerCounter::Returned),
            other => Err(format!("unknown partner counter '{}'", other)),
        }
    }
}

/// The three counters without row metadata, used when staging updates
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsignmentCounts {
    pub allocated: i64,
    pub sold: i64,
    pub returned: i64,
}

impl ConsignmentCounts {
    pub fn get(&self, counter: PartnerCounter) -> i64 {
        match counter {
            PartnerCounter::Allocated => self.allocated,
            PartnerCounter::Sold => self.sold,
            PartnerCounter::Returned => self.returned,
        }
    }

    /// Add `delta` to one counter; `None` on overflow, leaving the counts untouched
    pub fn checked_add(&mut self, counter: PartnerCounter, delta: i64) -> Option<()> {
        let slot = match counter {
            PartnerCounter::Allocated => &mut self.allocated,
            PartnerCounter::Sold => &mut self.sold,
            PartnerCounter::Returned => &mut self.returned,
        };
        *slot = slot.checked_add(delta)?;
        Some(())
    }
}

impl PartnerStock {
    pub fn counts(&self) -> ConsignmentCounts {
        ConsignmentCounts {
            allocated: self.allocated_quantity,
            sold: self.sold_quantity,
            returned: self.returned_quantity,
        }
    }

    pub fn apply_counts(&mut self, counts: ConsignmentCounts) {
        self.allocated_quantity = counts.allocated;
        self.sold_quantity = counts.sold;
        self.returned_quantity = counts.returned;
    }
}
