//! Main ledger orchestration layer
//!
//! This module ties together storage, projection, and the consistency
//! guard into the high-level API consumed by the gateway.
//!
//! # Example
//!
//! ```no_run
//! use stockledger_core::{Config, Ledger, NewProduct, TransactionKind, LineInput};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> stockledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let widget = ledger.create_product(NewProduct {
//!         name: "Widget".into(),
//!         sku: "WID-1".into(),
//!         description: None,
//!         price: Decimal::new(1999, 2),
//!     })?;
//!
//!     ledger
//!         .record_transaction(
//!             TransactionKind::In,
//!             Some("initial stock".into()),
//!             &[LineInput { product_id: widget.id, quantity: 50 }],
//!         )
//!         .await?;
//!
//!     assert_eq!(ledger.current_stock(widget.id)?, 50);
//!     Ok(())
//! }
//! ```

use crate::{
    guard::ProductLocks,
    metrics::Metrics,
    projector::Projector,
    storage::{Storage, StorageStats},
    types::{
        LineInput, NewProduct, Product, ProductStock, ProductUpdate, StockLine, StockMovement,
        StockTransaction, TransactionKind,
    },
    Config, Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use uuid::Uuid;

/// Main ledger interface
pub struct Ledger {
    /// Durable store
    storage: Arc<Storage>,

    /// Read-side stock projection
    projector: Projector,

    /// Per-product write serialization
    locks: ProductLocks,

    /// Prometheus collectors
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let projector = Projector::new(storage.clone());
        let locks = ProductLocks::new(Duration::from_millis(config.guard.lock_timeout_ms));
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            storage,
            projector,
            locks,
            metrics,
        })
    }

    // Product registry

    /// Register a new product
    pub fn create_product(&self, new: NewProduct) -> Result<Product> {
        Self::validate_name(&new.name)?;
        Self::validate_sku(&new.sku)?;
        Self::validate_price(new.price)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: new.name,
            sku: new.sku,
            description: new.description,
            price: new.price,
            created_at: now,
            updated_at: now,
        };

        self.storage.insert_product(&product)?;

        tracing::info!(product_id = %product.id, name = %product.name, "Product registered");

        Ok(product)
    }

    /// Update an existing product's metadata
    pub fn update_product(&self, product_id: Uuid, update: ProductUpdate) -> Result<Product> {
        let existing = self.storage.get_product(product_id)?;
        let old_name = existing.name.clone();

        let mut product = existing;
        if let Some(name) = update.name {
            Self::validate_name(&name)?;
            product.name = name;
        }
        if let Some(sku) = update.sku {
            Self::validate_sku(&sku)?;
            product.sku = sku;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(price) = update.price {
            Self::validate_price(price)?;
            product.price = price;
        }
        product.updated_at = Utc::now();

        self.storage.update_product(&old_name, &product)?;

        Ok(product)
    }

    /// Delete a product
    ///
    /// Refused with [`Error::ProductInUse`] while any ledger line
    /// references the product; committed history is never rewritten.
    /// Takes the product's write lock so the check cannot race an
    /// in-flight transaction touching the same product.
    pub async fn delete_product(&self, product_id: Uuid) -> Result<()> {
        let product = self.storage.get_product(product_id)?;

        let _held = self.locks.acquire(&[product_id]).await?;

        if self.storage.product_has_movements(product_id)? {
            return Err(Error::ProductInUse(product_id));
        }

        self.storage.delete_product(&product)?;

        // The lock table entry has no further use
        self.locks.evict(product_id);

        Ok(())
    }

    /// Get product by ID
    pub fn get_product(&self, product_id: Uuid) -> Result<Product> {
        self.storage.get_product(product_id)
    }

    /// List all products
    pub fn list_products(&self) -> Result<Vec<Product>> {
        self.storage.list_products()
    }

    // Ledger operations

    /// Record a stock transaction with its line items
    ///
    /// The whole transaction commits or none of it does. Checks and
    /// the append run inside one per-product critical section, so no
    /// interleaving writer can pass against the same snapshot: OUT is
    /// checked for sufficiency, IN for remaining headroom in the
    /// aggregate.
    pub async fn record_transaction(
        &self,
        transaction_type: TransactionKind,
        remarks: Option<String>,
        lines: &[LineInput],
    ) -> Result<StockTransaction> {
        let start = Instant::now();
        let result = self
            .record_transaction_inner(transaction_type, remarks, lines)
            .await;
        self.metrics.observe_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(transaction) => {
                self.metrics.record_commit(lines.len());
                tracing::info!(
                    transaction_id = %transaction.id,
                    transaction_type = %transaction.transaction_type,
                    lines = lines.len(),
                    "Transaction committed"
                );
            }
            Err(e) => {
                self.metrics.record_rejection(e.reason());
                tracing::warn!(%transaction_type, error = %e, "Transaction rejected");
            }
        }

        result
    }

    async fn record_transaction_inner(
        &self,
        transaction_type: TransactionKind,
        remarks: Option<String>,
        lines: &[LineInput],
    ) -> Result<StockTransaction> {
        // Local preconditions before touching the store
        if lines.is_empty() {
            return Err(Error::EmptyTransaction);
        }
        for (i, line) in lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(Error::InvalidQuantity {
                    line: i,
                    quantity: line.quantity,
                });
            }
        }

        // A transaction listing one product twice is checked against
        // the summed quantity, not per line. The sum is checked so a
        // request cannot smuggle in an unrepresentable total.
        let mut requested: HashMap<Uuid, i64> = HashMap::new();
        for line in lines {
            let total = requested.entry(line.product_id).or_insert(0);
            *total = total
                .checked_add(line.quantity)
                .ok_or(Error::StockOverflow {
                    product_id: line.product_id,
                })?;
        }
        let mut product_ids: Vec<Uuid> = requested.keys().copied().collect();
        product_ids.sort_unstable();

        // Critical section: check-then-append is atomic per product
        let _held = self.locks.acquire(&product_ids).await?;

        for &product_id in &product_ids {
            self.storage.get_product(product_id)?;
        }

        for &product_id in &product_ids {
            let available = self.projector.current_stock(product_id)?;
            let wanted = requested[&product_id];
            match transaction_type {
                TransactionKind::Out => {
                    if wanted > available {
                        return Err(Error::InsufficientStock {
                            product_id,
                            requested: wanted,
                            available,
                        });
                    }
                }
                TransactionKind::In => {
                    // No committed history may push the aggregate past
                    // i64::MAX, or every later read of this product
                    // would fail.
                    if available.checked_add(wanted).is_none() {
                        return Err(Error::StockOverflow { product_id });
                    }
                }
            }
        }

        let transaction = StockTransaction {
            id: Uuid::now_v7(),
            transaction_type,
            date: Utc::now(),
            remarks,
            line_count: lines.len() as u32,
        };
        let line_records: Vec<StockLine> = lines
            .iter()
            .map(|line| StockLine {
                transaction_id: transaction.id,
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect();

        self.storage.append_transaction(&transaction, &line_records)?;

        Ok(transaction)
    }

    /// Current stock for a product
    pub fn current_stock(&self, product_id: Uuid) -> Result<i64> {
        self.metrics.record_stock_read();
        self.projector.current_stock(product_id)
    }

    /// Every product with its computed current stock, ordered by name
    pub fn dashboard(&self) -> Result<Vec<ProductStock>> {
        let mut products = self.storage.list_products()?;
        products.sort_by(|a, b| a.name.cmp(&b.name));

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let stocks = self.projector.bulk_current_stock(&ids)?;

        Ok(products
            .into_iter()
            .map(|product| {
                let current_stock = stocks[&product.id];
                ProductStock {
                    product,
                    current_stock,
                }
            })
            .collect())
    }

    /// All transactions, date descending
    pub fn list_transactions(&self) -> Result<Vec<StockTransaction>> {
        self.storage.list_transactions()
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<StockTransaction> {
        self.storage.get_transaction(transaction_id)
    }

    /// Line items of a transaction, in append order
    pub fn transaction_lines(&self, transaction_id: Uuid) -> Result<Vec<StockLine>> {
        self.storage.get_transaction_lines(transaction_id)
    }

    /// Full movement history for a product, oldest first
    pub fn movements_for_product(&self, product_id: Uuid) -> Result<Vec<StockMovement>> {
        self.storage.get_product(product_id)?;
        self.storage.movements_for_product(product_id)
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Metrics collectors (for export at the gateway)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Validation

    fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidProduct("Name must not be empty".to_string()));
        }
        Ok(())
    }

    fn validate_sku(sku: &str) -> Result<()> {
        if sku.trim().is_empty() {
            return Err(Error::InvalidProduct("SKU must not be empty".to_string()));
        }
        Ok(())
    }

    fn validate_price(price: Decimal) -> Result<()> {
        if price < Decimal::ZERO {
            return Err(Error::InvalidProduct(format!(
                "Price must not be negative (got {})",
                price
            )));
        }
        Ok(())
    }
}
