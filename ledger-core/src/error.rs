//! Error types for the stock ledger

use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Transaction carries zero line items
    #[error("Transaction must carry at least one line item")]
    EmptyTransaction,

    /// Line quantity is zero or negative
    #[error("Line {line}: quantity must be greater than 0 (got {quantity})")]
    InvalidQuantity {
        /// Zero-based line index in the request
        line: usize,
        /// Rejected quantity
        quantity: i64,
    },

    /// Product field validation failure (name, SKU, price)
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// Product name already registered
    #[error("Product name already exists: {0}")]
    DuplicateName(String),

    /// Stock-out exceeds available quantity
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Product short on stock
        product_id: Uuid,
        /// Total quantity the transaction asked for
        requested: i64,
        /// Stock available at check time
        available: i64,
    },

    /// Stock level would leave the representable range
    #[error("Stock level for product {product_id} exceeds the representable range")]
    StockOverflow {
        /// Product whose aggregate overflowed
        product_id: Uuid,
    },

    /// Product not found
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    /// Product is referenced by ledger lines and cannot be deleted
    #[error("Product {0} is referenced by the ledger and cannot be deleted")]
    ProductInUse(Uuid),

    /// Could not acquire per-product exclusivity in time
    #[error("Timed out waiting for exclusive access to product {product_id}")]
    LockTimeout {
        /// Contended product
        product_id: Uuid,
    },

    /// Internal invariant violation (negative derived stock, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Stable machine-readable reason code for API consumers
    pub fn reason(&self) -> &'static str {
        match self {
            Error::EmptyTransaction => "EmptyTransaction",
            Error::InvalidQuantity { .. } => "InvalidQuantity",
            Error::InvalidProduct(_) => "InvalidProduct",
            Error::DuplicateName(_) => "DuplicateName",
            Error::InsufficientStock { .. } => "InsufficientStock",
            Error::StockOverflow { .. } => "StockOverflow",
            Error::ProductNotFound(_) => "ProductNotFound",
            Error::TransactionNotFound(_) => "TransactionNotFound",
            Error::ProductInUse(_) => "ProductInUse",
            Error::LockTimeout { .. } => "LockTimeout",
            Error::InvariantViolation(_) => "InvariantViolation",
            Error::Storage(_) => "StorageError",
            Error::Serialization(_) => "SerializationError",
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let id = Uuid::nil();
        let err = Error::InsufficientStock {
            product_id: id,
            requested: 40,
            available: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("requested 40"));
        assert!(msg.contains("available 30"));
        assert_eq!(err.reason(), "InsufficientStock");
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(Error::EmptyTransaction.reason(), "EmptyTransaction");
        assert_eq!(
            Error::InvalidQuantity { line: 0, quantity: -1 }.reason(),
            "InvalidQuantity"
        );
        assert_eq!(Error::ProductNotFound(Uuid::nil()).reason(), "ProductNotFound");
    }
}
