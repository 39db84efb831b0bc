//! Append-only stock ledger entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PartnerCounter;

/// Kind of stock-affecting event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Copies entering publisher stock (print run, initial seed top-up)
    InitialStock,
    /// Retail sale booked against publisher stock
    Sale,
    /// Release of a retail sale whose order was cancelled after validation
    SaleCancellation,
    PartnerAllocation,
    PartnerSale,
    PartnerReturn,
    Correction,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::InitialStock => "INITIAL_STOCK",
            MovementType::Sale => "SALE",
            MovementType::SaleCancellation => "SALE_CANCELLATION",
            MovementType::PartnerAllocation => "PARTNER_ALLOCATION",
            MovementType::PartnerSale => "PARTNER_SALE",
            MovementType::PartnerReturn => "PARTNER_RETURN",
            MovementType::Correction => "CORRECTION",
        }
    }

    /// Counter effects of recording `count` copies of this type.
    ///
    /// Returns `None` for [`MovementType::Correction`], whose shape is taken
    /// from the entry it corrects.
    pub fn shape(&self, count: i64) -> Option<MovementShape> {
        let shape = match self {
            MovementType::InitialStock | MovementType::SaleCancellation => {
                MovementShape::publisher(count)
            }
            MovementType::Sale => MovementShape::publisher(-count),
            MovementType::PartnerAllocation => {
                MovementShape::partner(PartnerCounter::Allocated, count)
            }
            MovementType::PartnerSale => MovementShape::partner(PartnerCounter::Sold, count),
            MovementType::PartnerReturn => MovementShape::partner(PartnerCounter::Returned, count),
            MovementType::Correction => return None,
        };
        Some(shape)
    }

    pub fn is_partner_movement(&self) -> bool {
        matches!(
            self,
            MovementType::PartnerAllocation | MovementType::PartnerSale | MovementType::PartnerReturn
        )
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL_STOCK" => Ok(MovementType::InitialStock),
            "SALE" => Ok(MovementType::Sale),
            "SALE_CANCELLATION" => Ok(MovementType::SaleCancellation),
            "PARTNER_ALLOCATION" => Ok(MovementType::PartnerAllocation),
            "PARTNER_SALE" => Ok(MovementType::PartnerSale),
            "PARTNER_RETURN" => Ok(MovementType::PartnerReturn),
            "CORRECTION" => Ok(MovementType::Correction),
            other => Err(format!("unknown movement type '{}'", other)),
        }
    }
}

/// Signed counter effects of one ledger entry.
///
/// `stock_delta` applies to `Work.stock` and `Work.physical_stock`;
/// `partner` names the consignment counter and its delta, if any.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovementShape {
    pub stock_delta: i64,
    pub partner: Option<(PartnerCounter, i64)>,
}

impl MovementShape {
    pub fn publisher(stock_delta: i64) -> Self {
        Self {
            stock_delta,
            partner: None,
        }
    }

    /// Partner movement of `count` copies; the publisher side follows the counter
    pub fn partner(counter: PartnerCounter, count: i64) -> Self {
        Self {
            stock_delta: counter.stock_factor() * count,
            partner: Some((counter, count)),
        }
    }

    pub fn negated(&self) -> Self {
        Self {
            stock_delta: -self.stock_delta,
            partner: self.partner.map(|(counter, delta)| (counter, -delta)),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.stock_delta == 0 && self.partner.map_or(true, |(_, delta)| delta == 0)
    }
}

/// One immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: Uuid,
    pub work_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub movement_type: MovementType,
    /// Signed delta applied to `Work.stock`
    pub quantity: i64,
    pub partner_counter: Option<PartnerCounter>,
    /// Signed delta applied to `partner_counter`
    pub partner_quantity: i64,
    pub unit_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub reason: String,
    /// Idempotency / grouping key
    pub reference: String,
    pub performed_by: Uuid,
    pub order_id: Option<Uuid>,
    pub is_correction: bool,
    pub correction_reason: Option<String>,
    pub corrected_movement_id: Option<Uuid>,
    /// Absolute stock value set by a quantity correction
    pub resulting_stock: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn shape(&self) -> MovementShape {
        MovementShape {
            stock_delta: self.quantity,
            partner: self
                .partner_counter
                .map(|counter| (counter, self.partner_quantity)),
        }
    }

    /// Quantity a movement correction replaces: the partner count for
    /// consignment entries, the signed stock delta otherwise
    pub fn primary_quantity(&self) -> i64 {
        match self.partner_counter {
            Some(_) => self.partner_quantity,
            None => self.quantity,
        }
    }

    /// Shape of an entry with the same kind as this one but `primary` copies
    pub fn reshaped(&self, primary: i64) -> MovementShape {
        match self.partner_counter {
            Some(counter) => MovementShape::partner(counter, primary),
            None => MovementShape::publisher(primary),
        }
    }
}

/// Filter for ledger history queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub work_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub corrections_only: Option<bool>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.work_id.map_or(true, |id| movement.work_id == id)
            && self
                .partner_id
                .map_or(true, |id| movement.partner_id == Some(id))
            && self
                .movement_type
                .map_or(true, |t| movement.movement_type == t)
            && self
                .corrections_only
                .map_or(true, |only| !only || movement.is_correction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_moves_copies_out_of_publisher_stock() {
        let shape = MovementType::PartnerAllocation.shape(10).unwrap();
        assert_eq!(shape.stock_delta, -10);
        assert_eq!(shape.partner, Some((PartnerCounter::Allocated, 10)));
    }

    #[test]
    fn partner_sale_leaves_publisher_stock_alone() {
        let shape = MovementType::PartnerSale.shape(25).unwrap();
        assert_eq!(shape.stock_delta, 0);
        assert_eq!(shape.partner, Some((PartnerCounter::Sold, 25)));
    }

    #[test]
    fn return_brings_copies_back() {
        let shape = MovementType::PartnerReturn.shape(3).unwrap();
        assert_eq!(shape.stock_delta, 3);
        assert_eq!(shape.partner, Some((PartnerCounter::Returned, 3)));
    }

    #[test]
    fn correction_has_no_intrinsic_shape() {
        assert!(MovementType::Correction.shape(1).is_none());
    }

    #[test]
    fn negated_shape_cancels() {
        let shape = MovementShape::partner(PartnerCounter::Allocated, 7);
        let neg = shape.negated();
        assert_eq!(shape.stock_delta + neg.stock_delta, 0);
        assert_eq!(neg.partner, Some((PartnerCounter::Allocated, -7)));
    }

    #[test]
    fn movement_type_parses_wire_names() {
        for t in [
            MovementType::InitialStock,
            MovementType::Sale,
            MovementType::SaleCancellation,
            MovementType::PartnerAllocation,
            MovementType::PartnerSale,
            MovementType::PartnerReturn,
            MovementType::Correction,
        ] {
            assert_eq!(t.as_str().parse::<MovementType>(), Ok(t));
        }
    }
}
