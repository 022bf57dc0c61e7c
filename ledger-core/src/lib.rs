//! StockLedger Core
//!
//! Append-only stock ledger with a race-free consistency engine.
//!
//! # Architecture
//!
//! - **Ledger Store**: durable append-only record of transactions and
//!   line items (RocksDB, atomic batch commits)
//! - **Stock Projector**: current stock derived by folding IN/OUT
//!   movements, never stored as ground truth
//! - **Consistency Guard**: per-product write serialization so the
//!   sufficiency check and the append form one atomic unit
//! - **Ledger facade**: the API the gateway consumes
//!
//! # Invariants
//!
//! - Line quantities are strictly positive
//! - current_stock(P) == Σ IN(P) − Σ OUT(P), exactly
//! - No committed stock-out drives a product's stock negative
//! - Transactions are never modified or deleted once committed

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod metrics;
pub mod projector;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use types::{
    LineInput, NewProduct, Product, ProductStock, ProductUpdate, StockLine, StockMovement,
    StockTransaction, TransactionKind,
};
