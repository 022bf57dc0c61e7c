//! Stock projection: deriving current stock from the movement ledger
//!
//! Stock is never stored as ground truth. The projector folds the
//! per-product movement index (IN adds, OUT subtracts) on every read,
//! exactly like the original aggregation, so P1 holds by construction.

use crate::{
    error::{Error, Result},
    storage::Storage,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Pure read-side projection over the ledger store
#[derive(Clone)]
pub struct Projector {
    storage: Arc<Storage>,
}

impl Projector {
    /// Create a projector over the given store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Current stock for one product: Σ IN − Σ OUT
    ///
    /// Never clamps. A negative sum means the consistency guard was
    /// bypassed and surfaces as [`Error::InvariantViolation`]. The fold
    /// is checked: an aggregate outside the `i64` range is reported as
    /// [`Error::StockOverflow`] rather than wrapping silently.
    pub fn current_stock(&self, product_id: Uuid) -> Result<i64> {
        // Unknown product is NotFound, not zero stock
        self.storage.get_product(product_id)?;

        let mut stock: i64 = 0;
        for movement in &self.storage.movements_for_product(product_id)? {
            stock = stock
                .checked_add(movement.delta())
                .ok_or(Error::StockOverflow { product_id })?;
        }

        if stock < 0 {
            return Err(Error::InvariantViolation(format!(
                "Derived stock for product {} is negative ({})",
                product_id, stock
            )));
        }

        Ok(stock)
    }

    /// Current stock for a batch of products
    ///
    /// Aggregate form used by dashboard/listing views to avoid one
    /// scan per caller-side loop iteration.
    pub fn bulk_current_stock(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        let mut stocks = HashMap::with_capacity(product_ids.len());
        for &product_id in product_ids {
            stocks.insert(product_id, self.current_stock(product_id)?);
        }
        Ok(stocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Product, StockLine, StockTransaction, TransactionKind};
    use crate::Config;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_setup() -> (Arc<Storage>, Projector, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        let projector = Projector::new(storage.clone());
        (storage, projector, temp_dir)
    }

    fn insert_product(storage: &Storage, name: &str) -> Uuid {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            sku: format!("SKU-{}", name.to_uppercase()),
            description: None,
            price: Decimal::ONE,
            created_at: now,
            updated_at: now,
        };
        storage.insert_product(&product).unwrap();
        product.id
    }

    fn append(storage: &Storage, product_id: Uuid, kind: TransactionKind, quantity: i64) {
        let transaction = StockTransaction {
            id: Uuid::now_v7(),
            transaction_type: kind,
            date: Utc::now(),
            remarks: None,
            line_count: 1,
        };
        let lines = vec![StockLine {
            transaction_id: transaction.id,
            product_id,
            quantity,
        }];
        storage.append_transaction(&transaction, &lines).unwrap();
    }

    #[test]
    fn test_stock_is_in_minus_out() {
        let (storage, projector, _temp) = test_setup();
        let product_id = insert_product(&storage, "widget");

        assert_eq!(projector.current_stock(product_id).unwrap(), 0);

        append(&storage, product_id, TransactionKind::In, 50);
        assert_eq!(projector.current_stock(product_id).unwrap(), 50);

        append(&storage, product_id, TransactionKind::Out, 20);
        assert_eq!(projector.current_stock(product_id).unwrap(), 30);
    }

    #[test]
    fn test_unknown_product_is_not_found() {
        let (_storage, projector, _temp) = test_setup();
        let result = projector.current_stock(Uuid::new_v4());
        assert!(matches!(result, Err(Error::ProductNotFound(_))));
    }

    #[test]
    fn test_negative_stock_is_invariant_violation() {
        let (storage, projector, _temp) = test_setup();
        let product_id = insert_product(&storage, "widget");

        // Bypass the guard by appending an unchecked OUT directly
        append(&storage, product_id, TransactionKind::Out, 5);

        let result = projector.current_stock(product_id);
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_overflowing_aggregate_is_an_error_not_a_wrap() {
        let (storage, projector, _temp) = test_setup();
        let product_id = insert_product(&storage, "widget");

        append(&storage, product_id, TransactionKind::In, i64::MAX);
        assert_eq!(projector.current_stock(product_id).unwrap(), i64::MAX);

        append(&storage, product_id, TransactionKind::In, i64::MAX);
        let result = projector.current_stock(product_id);
        assert!(matches!(
            result,
            Err(Error::StockOverflow { product_id: p }) if p == product_id
        ));
    }

    #[test]
    fn test_bulk_matches_single() {
        let (storage, projector, _temp) = test_setup();
        let widget = insert_product(&storage, "widget");
        let gadget = insert_product(&storage, "gadget");

        append(&storage, widget, TransactionKind::In, 10);
        append(&storage, gadget, TransactionKind::In, 7);
        append(&storage, gadget, TransactionKind::Out, 3);

        let stocks = projector.bulk_current_stock(&[widget, gadget]).unwrap();
        assert_eq!(stocks[&widget], projector.current_stock(widget).unwrap());
        assert_eq!(stocks[&gadget], projector.current_stock(gadget).unwrap());
        assert_eq!(stocks[&gadget], 4);
    }

    #[test]
    fn test_read_is_idempotent() {
        let (storage, projector, _temp) = test_setup();
        let product_id = insert_product(&storage, "widget");
        append(&storage, product_id, TransactionKind::In, 12);

        let first = projector.current_stock(product_id).unwrap();
        let second = projector.current_stock(product_id).unwrap();
        assert_eq!(first, second);
    }
}
