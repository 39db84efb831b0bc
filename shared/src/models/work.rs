//! Sellable titles and their publisher-owned stock

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Work {
    pub id: Uuid,
    pub title: String,
    pub isbn: String,
    /// Unit price in F CFA
    pub price: Decimal,
    /// Publisher-owned available count
    pub stock: i64,
    /// Warehouse count, moved in lockstep with `stock`
    pub physical_stock: i64,
    pub min_stock: i64,
    pub max_stock: Option<i64>,
    pub status: WorkStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Publishing workflow status of a work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    Draft,
    Submitted,
    Validated,
    Published,
    OnSale,
    Rejected,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Draft => "DRAFT",
            WorkStatus::Submitted => "SUBMITTED",
            WorkStatus::Validated => "VALIDATED",
            WorkStatus::Published => "PUBLISHED",
            WorkStatus::OnSale => "ON_SALE",
            WorkStatus::Rejected => "REJECTED",
        }
    }

    /// Only published titles can be allocated to partners or sold
    pub fn is_sellable(&self) -> bool {
        matches!(self, WorkStatus::Published | WorkStatus::OnSale)
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(WorkStatus::Draft),
            "SUBMITTED" => Ok(WorkStatus::Submitted),
            "VALIDATED" => Ok(WorkStatus::Validated),
            "PUBLISHED" => Ok(WorkStatus::Published),
            "ON_SALE" => Ok(WorkStatus::OnSale),
            "REJECTED" => Ok(WorkStatus::Rejected),
            other => Err(format!("unknown work status '{}'", other)),
        }
    }
}

/// Stock level of a work relative to its thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    Low,
    Normal,
    Over,
}

impl Work {
    /// Classify the current stock against `min_stock` / `max_stock`
    pub fn stock_level(&self) -> StockLevel {
        if self.stock <= 0 {
            StockLevel::OutOfStock
        } else if self.stock <= self.min_stock {
            StockLevel::Low
        } else if self.max_stock.is_some_and(|max| self.stock > max) {
            StockLevel::Over
        } else {
            StockLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_with(stock: i64, min: i64, max: Option<i64>) -> Work {
        Work {
            id: Uuid::new_v4(),
            title: "Mathématiques 6e".to_string(),
            isbn: "978-2-00-000000-1".to_string(),
            price: Decimal::from(5000),
            stock,
            physical_stock: stock,
            min_stock: min,
            max_stock: max,
            status: WorkStatus::Published,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stock_level_thresholds() {
        assert_eq!(work_with(0, 5, None).stock_level(), StockLevel::OutOfStock);
        assert_eq!(work_with(5, 5, None).stock_level(), StockLevel::Low);
        assert_eq!(work_with(6, 5, Some(100)).stock_level(), StockLevel::Normal);
        assert_eq!(work_with(101, 5, Some(100)).stock_level(), StockLevel::Over);
    }

    #[test]
    fn drafts_are_not_sellable() {
        assert!(!WorkStatus::Draft.is_sellable());
        assert!(WorkStatus::OnSale.is_sellable());
    }
}
