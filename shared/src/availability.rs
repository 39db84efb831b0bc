//! Available-to-sell calculation for publisher and partner views
//!
//! Pure functions only. A computed negative availability is reported as an
//! [`IntegrityError`], never floored to zero.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ConsignmentCounts, PartnerStock, Work};

/// Counters whose availability would be negative
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// Breaks `0 <= sold + returned <= allocated`
    #[error(
        "consignment counters inconsistent for work {work_id}: allocated {allocated}, sold {sold}, returned {returned}"
    )]
    Consignment {
        work_id: Uuid,
        allocated: i64,
        sold: i64,
        returned: i64,
    },
    #[error("publisher stock of work {work_id} is negative: {stock}")]
    NegativeStock { work_id: Uuid, stock: i64 },
}

/// Display status of a partner's availability for one work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    /// No consignment row exists for this partner and work
    NotAllocated,
    /// A row exists and everything allocated is sold or returned
    Exhausted,
    Available,
}

impl AvailabilityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AvailabilityStatus::NotAllocated => "not allocated",
            AvailabilityStatus::Exhausted => "exhausted",
            AvailabilityStatus::Available => "available",
        }
    }
}

/// Availability of one work for one partner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartnerAvailability {
    pub work_id: Uuid,
    pub available: i64,
    pub status: AvailabilityStatus,
}

/// Check the allocation bound on raw counters
pub fn check_counts(work_id: Uuid, counts: &ConsignmentCounts) -> Result<i64, IntegrityError> {
    let inconsistent = || IntegrityError::Consignment {
        work_id,
        allocated: counts.allocated,
        sold: counts.sold,
        returned: counts.returned,
    };
    if counts.allocated < 0 || counts.sold < 0 || counts.returned < 0 {
        return Err(inconsistent());
    }
    let consumed = counts
        .sold
        .checked_add(counts.returned)
        .ok_or_else(inconsistent)?;
    if consumed > counts.allocated {
        return Err(inconsistent());
    }
    Ok(counts.allocated - consumed)
}

/// `allocated - sold - returned`, or an integrity error if that is negative
pub fn available_quantity(stock: &PartnerStock) -> Result<i64, IntegrityError> {
    check_counts(stock.work_id, &stock.counts())
}

/// Availability for a partner view, distinguishing "never allocated" from "exhausted"
pub fn partner_availability(
    work_id: Uuid,
    stock: Option<&PartnerStock>,
) -> Result<PartnerAvailability, IntegrityError> {
    let Some(stock) = stock else {
        return Ok(PartnerAvailability {
            work_id,
            available: 0,
            status: AvailabilityStatus::NotAllocated,
        });
    };

    let available = available_quantity(stock)?;
    let status = if available == 0 {
        AvailabilityStatus::Exhausted
    } else {
        AvailabilityStatus::Available
    };

    Ok(PartnerAvailability {
        work_id,
        available,
        status,
    })
}

/// Publisher-side availability; negative stock is an integrity error
pub fn work_availability(work: &Work) -> Result<i64, IntegrityError> {
    if work.stock < 0 {
        return Err(IntegrityError::NegativeStock {
            work_id: work.id,
            stock: work.stock,
        });
    }
    Ok(work.stock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn consignment(allocated: i64, sold: i64, returned: i64) -> PartnerStock {
        PartnerStock {
            id: Uuid::new_v4(),
            partner_id: Uuid::new_v4(),
            work_id: Uuid::new_v4(),
            allocated_quantity: allocated,
            sold_quantity: sold,
            returned_quantity: returned,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_is_allocated_minus_consumed() {
        let stock = consignment(50, 20, 5);
        assert_eq!(available_quantity(&stock), Ok(25));
    }

    #[test]
    fn negative_availability_is_an_error() {
        let stock = consignment(10, 8, 5);
        let err = available_quantity(&stock).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::Consignment {
                work_id: stock.work_id,
                allocated: 10,
                sold: 8,
                returned: 5,
            }
        );
    }

    #[test]
    fn overflowing_counters_are_inconsistent() {
        let stock = consignment(i64::MAX, i64::MAX, 1);
        assert!(matches!(
            available_quantity(&stock),
            Err(IntegrityError::Consignment { .. })
        ));
    }

    #[test]
    fn negative_publisher_stock_names_the_stock() {
        let work = Work {
            id: Uuid::new_v4(),
            title: "Contes".to_string(),
            isbn: "978-2-000-00000-1".to_string(),
            price: rust_decimal::Decimal::from(1000),
            stock: -3,
            physical_stock: -3,
            min_stock: 0,
            max_stock: None,
            status: crate::models::WorkStatus::Published,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = work_availability(&work).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::NegativeStock {
                work_id: work.id,
                stock: -3,
            }
        );
        assert_eq!(
            err.to_string(),
            format!("publisher stock of work {} is negative: -3", work.id)
        );
    }

    #[test]
    fn missing_row_is_not_allocated() {
        let availability = partner_availability(Uuid::new_v4(), None).unwrap();
        assert_eq!(availability.available, 0);
        assert_eq!(availability.status, AvailabilityStatus::NotAllocated);
    }

    #[test]
    fn zero_available_row_is_exhausted() {
        let stock = consignment(50, 45, 5);
        let availability = partner_availability(stock.work_id, Some(&stock)).unwrap();
        assert_eq!(availability.available, 0);
        assert_eq!(availability.status, AvailabilityStatus::Exhausted);
        assert_eq!(availability.status.label(), "exhausted");
    }

    proptest! {
        #[test]
        fn bound_holds_iff_available_is_non_negative(
            allocated in 0i64..500,
            sold in 0i64..500,
            returned in 0i64..500,
        ) {
            let stock = consignment(allocated, sold, returned);
            let result = available_quantity(&stock);
            if sold + returned <= allocated {
                prop_assert_eq!(result, Ok(allocated - sold - returned));
            } else {
                prop_assert!(result.is_err());
            }
        }
    }
}
