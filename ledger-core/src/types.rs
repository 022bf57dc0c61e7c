//! Core types for the stock ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for prices, integer quantities)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transaction kind: stock moving in or out of inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Stock In
    #[serde(rename = "IN")]
    In,
    /// Stock Out
    #[serde(rename = "OUT")]
    Out,
}

impl TransactionKind {
    /// Wire code ("IN" / "OUT")
    pub fn code(&self) -> &'static str {
        match self {
            TransactionKind::In => "IN",
            TransactionKind::Out => "OUT",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(TransactionKind::In),
            "OUT" => Some(TransactionKind::Out),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Product master record
///
/// Carries no stock counter: current stock is always derived from the
/// movement ledger (see [`crate::projector`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID
    pub id: Uuid,

    /// Unique product name
    pub name: String,

    /// Stock-keeping unit code
    pub sku: String,

    /// Free-text description
    pub description: Option<String>,

    /// Unit price (exact decimal, never negative)
    pub price: Decimal,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Fields for registering a new product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    /// Unique product name
    pub name: String,
    /// Stock-keeping unit code
    pub sku: String,
    /// Free-text description
    pub description: Option<String>,
    /// Unit price
    pub price: Decimal,
}

/// Partial update for an existing product
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    /// New name (must remain unique)
    pub name: Option<String>,
    /// New SKU
    pub sku: Option<String>,
    /// New description (`Some(None)` clears it)
    pub description: Option<Option<String>>,
    /// New unit price
    pub price: Option<Decimal>,
}

/// Stock transaction header (stckmain)
///
/// Append-only: once committed a transaction is never mutated or
/// deleted. The ID is a UUIDv7 so storage order matches `date` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// IN or OUT
    pub transaction_type: TransactionKind,

    /// Server-assigned creation timestamp, immutable
    pub date: DateTime<Utc>,

    /// Free-text remark
    pub remarks: Option<String>,

    /// Number of line items
    pub line_count: u32,
}

/// Line item within a transaction (stckdetail)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    /// Owning transaction
    pub transaction_id: Uuid,

    /// Referenced product
    pub product_id: Uuid,

    /// Quantity moved (strictly positive)
    pub quantity: i64,
}

/// Requested line item: (product, quantity) pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineInput {
    /// Referenced product
    pub product_id: Uuid,
    /// Quantity to move
    pub quantity: i64,
}

/// One ledger movement for a product, as stored in the per-product index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    /// Transaction that caused the movement
    pub transaction_id: Uuid,

    /// IN or OUT
    pub transaction_type: TransactionKind,

    /// Quantity moved (strictly positive)
    pub quantity: i64,

    /// Transaction date
    pub date: DateTime<Utc>,
}

impl StockMovement {
    /// Signed stock delta: positive for IN, negative for OUT
    pub fn delta(&self) -> i64 {
        match self.transaction_type {
            TransactionKind::In => self.quantity,
            TransactionKind::Out => -self.quantity,
        }
    }
}

/// Product plus its computed current stock (dashboard row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductStock {
    /// The product
    pub product: Product,
    /// Current stock: Σ IN − Σ OUT over the ledger
    pub current_stock: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(TransactionKind::In.code(), "IN");
        assert_eq!(TransactionKind::Out.code(), "OUT");
        assert_eq!(TransactionKind::parse("IN"), Some(TransactionKind::In));
        assert_eq!(TransactionKind::parse("OUT"), Some(TransactionKind::Out));
        assert_eq!(TransactionKind::parse("SIDEWAYS"), None);
    }

    #[test]
    fn test_kind_serde_wire_format() {
        assert_eq!(
            serde_json::to_string(&TransactionKind::In).unwrap(),
            "\"IN\""
        );
        assert_eq!(
            serde_json::from_str::<TransactionKind>("\"OUT\"").unwrap(),
            TransactionKind::Out
        );
    }

    #[test]
    fn test_movement_delta() {
        let movement = StockMovement {
            transaction_id: Uuid::now_v7(),
            transaction_type: TransactionKind::In,
            quantity: 25,
            date: Utc::now(),
        };
        assert_eq!(movement.delta(), 25);

        let movement = StockMovement {
            transaction_type: TransactionKind::Out,
            ..movement
        };
        assert_eq!(movement.delta(), -25);
    }

    #[test]
    fn test_transaction_ids_are_time_ordered() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert!(a.as_bytes() <= b.as_bytes());
    }
}
