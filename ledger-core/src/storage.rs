//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `products` - Product master records (key: product_id)
//! - `product_names` - Name uniqueness index (key: name, value: product_id)
//! - `transactions` - Append-only transaction log (key: transaction_id, UUIDv7)
//! - `lines` - Line items (key: transaction_id || seq)
//! - `movements` - Per-product movement index (key: product_id || transaction_id || seq)
//!
//! Transaction IDs are UUIDv7, so iterating `transactions` backwards
//! yields date-descending order without a secondary index.

use crate::{
    error::{Error, Result},
    types::{Product, StockLine, StockMovement, StockTransaction},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, DB,
};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Column family names
const CF_PRODUCTS: &str = "products";
const CF_PRODUCT_NAMES: &str = "product_names";
const CF_TRANSACTIONS: &str = "transactions";
const CF_LINES: &str = "lines";
const CF_MOVEMENTS: &str = "movements";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Serializes writes to the name index. The uniqueness check and
    /// the batch write are separate RocksDB calls, so without this two
    /// concurrent registrations of the same name could both pass the
    /// check.
    name_lock: Mutex<()>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PRODUCTS, Self::cf_options_lz4()),
            ColumnFamilyDescriptor::new(CF_PRODUCT_NAMES, Self::cf_options_lz4()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_zstd()),
            ColumnFamilyDescriptor::new(CF_LINES, Self::cf_options_zstd()),
            ColumnFamilyDescriptor::new(CF_MOVEMENTS, Self::cf_options_lz4()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self {
            db: Arc::new(db),
            name_lock: Mutex::new(()),
        })
    }

    // The guard carries no data, so a poisoned name lock is still a
    // usable lock.
    fn lock_names(&self) -> std::sync::MutexGuard<'_, ()> {
        self.name_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Column family options

    fn cf_options_zstd() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_lz4() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Product operations

    /// Insert a new product, enforcing name uniqueness
    pub fn insert_product(&self, product: &Product) -> Result<()> {
        let cf_names = self.cf_handle(CF_PRODUCT_NAMES)?;

        let _names = self.lock_names();
        if self.db.get_cf(&cf_names, product.name.as_bytes())?.is_some() {
            return Err(Error::DuplicateName(product.name.clone()));
        }

        let cf_products = self.cf_handle(CF_PRODUCTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_products, product.id.as_bytes(), bincode::serialize(product)?);
        batch.put_cf(&cf_names, product.name.as_bytes(), product.id.as_bytes());
        self.db.write(batch)?;

        tracing::debug!(product_id = %product.id, name = %product.name, "Product inserted");

        Ok(())
    }

    /// Replace an existing product, moving the name index entry if the name changed
    pub fn update_product(&self, old_name: &str, product: &Product) -> Result<()> {
        let cf_names = self.cf_handle(CF_PRODUCT_NAMES)?;

        let _names = self.lock_names();
        if old_name != product.name {
            if self.db.get_cf(&cf_names, product.name.as_bytes())?.is_some() {
                return Err(Error::DuplicateName(product.name.clone()));
            }
        }

        let cf_products = self.cf_handle(CF_PRODUCTS)?;
        let mut batch = WriteBatch::default();
        if old_name != product.name {
            batch.delete_cf(&cf_names, old_name.as_bytes());
            batch.put_cf(&cf_names, product.name.as_bytes(), product.id.as_bytes());
        }
        batch.put_cf(&cf_products, product.id.as_bytes(), bincode::serialize(product)?);
        self.db.write(batch)?;

        Ok(())
    }

    /// Delete a product and its name index entry
    ///
    /// The caller (the ledger facade) is responsible for refusing the
    /// delete while ledger lines reference the product.
    pub fn delete_product(&self, product: &Product) -> Result<()> {
        let cf_products = self.cf_handle(CF_PRODUCTS)?;
        let cf_names = self.cf_handle(CF_PRODUCT_NAMES)?;

        let _names = self.lock_names();
        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_products, product.id.as_bytes());
        batch.delete_cf(&cf_names, product.name.as_bytes());
        self.db.write(batch)?;

        tracing::debug!(product_id = %product.id, "Product deleted");

        Ok(())
    }

    /// Get product by ID
    pub fn get_product(&self, product_id: Uuid) -> Result<Product> {
        let cf = self.cf_handle(CF_PRODUCTS)?;

        let value = self
            .db
            .get_cf(&cf, product_id.as_bytes())?
            .ok_or(Error::ProductNotFound(product_id))?;

        let product: Product = bincode::deserialize(&value)?;
        Ok(product)
    }

    /// Look up a product ID by name
    pub fn get_product_id_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_PRODUCT_NAMES)?;

        match self.db.get_cf(&cf, name.as_bytes())? {
            Some(bytes) => {
                let id_bytes: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt name index entry".to_string()))?;
                Ok(Some(Uuid::from_bytes(id_bytes)))
            }
            None => Ok(None),
        }
    }

    /// List all products
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let cf = self.cf_handle(CF_PRODUCTS)?;

        let mut products = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            products.push(bincode::deserialize(&value)?);
        }

        Ok(products)
    }

    /// Whether any ledger movement references the product
    pub fn product_has_movements(&self, product_id: Uuid) -> Result<bool> {
        let cf = self.cf_handle(CF_MOVEMENTS)?;
        let prefix = product_id.as_bytes().to_vec();

        let mut iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(&prefix))
            }
            None => Ok(false),
        }
    }

    // Transaction operations

    /// Append (transaction, lines, movement index entries) as one atomic unit
    pub fn append_transaction(
        &self,
        transaction: &StockTransaction,
        lines: &[StockLine],
    ) -> Result<()> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_lines = self.cf_handle(CF_LINES)?;
        let cf_movements = self.cf_handle(CF_MOVEMENTS)?;

        let mut batch = WriteBatch::default();

        batch.put_cf(
            &cf_transactions,
            transaction.id.as_bytes(),
            bincode::serialize(transaction)?,
        );

        for (seq, line) in lines.iter().enumerate() {
            let seq = seq as u32;

            batch.put_cf(
                &cf_lines,
                Self::line_key(transaction.id, seq),
                bincode::serialize(line)?,
            );

            let movement = StockMovement {
                transaction_id: transaction.id,
                transaction_type: transaction.transaction_type,
                quantity: line.quantity,
                date: transaction.date,
            };
            batch.put_cf(
                &cf_movements,
                Self::movement_key(line.product_id, transaction.id, seq),
                bincode::serialize(&movement)?,
            );
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %transaction.id,
            transaction_type = %transaction.transaction_type,
            lines = lines.len(),
            "Transaction appended"
        );

        Ok(())
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<StockTransaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let value = self
            .db
            .get_cf(&cf, transaction_id.as_bytes())?
            .ok_or(Error::TransactionNotFound(transaction_id))?;

        let transaction: StockTransaction = bincode::deserialize(&value)?;
        Ok(transaction)
    }

    /// Get all line items for a transaction, in append order
    pub fn get_transaction_lines(&self, transaction_id: Uuid) -> Result<Vec<StockLine>> {
        // Existence check first so an unknown ID is NotFound, not an empty list
        self.get_transaction(transaction_id)?;

        let cf = self.cf_handle(CF_LINES)?;
        let prefix = transaction_id.as_bytes().to_vec();

        let mut lines = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            lines.push(bincode::deserialize(&value)?);
        }

        Ok(lines)
    }

    /// List all transactions, date descending
    pub fn list_transactions(&self) -> Result<Vec<StockTransaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::End) {
            let (_, value) = item?;
            transactions.push(bincode::deserialize(&value)?);
        }

        Ok(transactions)
    }

    /// All ledger movements for a product, oldest first
    pub fn movements_for_product(&self, product_id: Uuid) -> Result<Vec<StockMovement>> {
        let cf = self.cf_handle(CF_MOVEMENTS)?;
        let prefix = product_id.as_bytes().to_vec();

        let mut movements = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            movements.push(bincode::deserialize(&value)?);
        }

        Ok(movements)
    }

    // Key helpers

    fn line_key(transaction_id: Uuid, seq: u32) -> Vec<u8> {
        let mut key = transaction_id.as_bytes().to_vec();
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn movement_key(product_id: Uuid, transaction_id: Uuid, seq: u32) -> Vec<u8> {
        let mut key = product_id.as_bytes().to_vec();
        key.extend_from_slice(transaction_id.as_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_products = self.cf_handle(CF_PRODUCTS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_lines = self.cf_handle(CF_LINES)?;

        Ok(StorageStats {
            total_products: self.approximate_count(&cf_products)?,
            total_transactions: self.approximate_count(&cf_transactions)?,
            total_lines: self.approximate_count(&cf_lines)?,
        })
    }

    fn approximate_count(&self, cf: &Arc<BoundColumnFamily<'_>>) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate product count
    pub total_products: u64,
    /// Approximate transaction count
    pub total_transactions: u64,
    /// Approximate line count
    pub total_lines: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionKind;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_product(name: &str) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            sku: format!("SKU-{}", name.to_uppercase()),
            description: None,
            price: Decimal::new(1999, 2),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_transaction(kind: TransactionKind, line_count: u32) -> StockTransaction {
        StockTransaction {
            id: Uuid::now_v7(),
            transaction_type: kind,
            date: Utc::now(),
            remarks: None,
            line_count,
        }
    }

    #[test]
    fn test_insert_and_get_product() {
        let (storage, _temp) = test_storage();
        let product = test_product("widget");

        storage.insert_product(&product).unwrap();

        let retrieved = storage.get_product(product.id).unwrap();
        assert_eq!(retrieved, product);

        let by_name = storage.get_product_id_by_name("widget").unwrap();
        assert_eq!(by_name, Some(product.id));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (storage, _temp) = test_storage();
        storage.insert_product(&test_product("widget")).unwrap();

        let result = storage.insert_product(&test_product("widget"));
        assert!(matches!(result, Err(Error::DuplicateName(_))));
    }

    #[test]
    fn test_update_product_moves_name_index() {
        let (storage, _temp) = test_storage();
        let mut product = test_product("widget");
        storage.insert_product(&product).unwrap();

        product.name = "gadget".to_string();
        storage.update_product("widget", &product).unwrap();

        assert_eq!(storage.get_product_id_by_name("widget").unwrap(), None);
        assert_eq!(
            storage.get_product_id_by_name("gadget").unwrap(),
            Some(product.id)
        );
    }

    #[test]
    fn test_delete_product() {
        let (storage, _temp) = test_storage();
        let product = test_product("widget");
        storage.insert_product(&product).unwrap();
        storage.delete_product(&product).unwrap();

        assert!(matches!(
            storage.get_product(product.id),
            Err(Error::ProductNotFound(_))
        ));
        assert_eq!(storage.get_product_id_by_name("widget").unwrap(), None);
    }

    #[test]
    fn test_atomic_append_and_read_back() {
        let (storage, _temp) = test_storage();
        let product = test_product("widget");
        storage.insert_product(&product).unwrap();

        let transaction = test_transaction(TransactionKind::In, 2);
        let lines = vec![
            StockLine {
                transaction_id: transaction.id,
                product_id: product.id,
                quantity: 50,
            },
            StockLine {
                transaction_id: transaction.id,
                product_id: product.id,
                quantity: 25,
            },
        ];

        storage.append_transaction(&transaction, &lines).unwrap();

        let retrieved = storage.get_transaction(transaction.id).unwrap();
        assert_eq!(retrieved, transaction);

        let retrieved_lines = storage.get_transaction_lines(transaction.id).unwrap();
        assert_eq!(retrieved_lines, lines);

        let movements = storage.movements_for_product(product.id).unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.transaction_id == transaction.id));
        assert_eq!(movements.iter().map(|m| m.delta()).sum::<i64>(), 75);
    }

    #[test]
    fn test_list_transactions_descending() {
        let (storage, _temp) = test_storage();
        let product = test_product("widget");
        storage.insert_product(&product).unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let transaction = test_transaction(TransactionKind::In, 1);
            let lines = vec![StockLine {
                transaction_id: transaction.id,
                product_id: product.id,
                quantity: 1,
            }];
            storage.append_transaction(&transaction, &lines).unwrap();
            ids.push(transaction.id);
        }

        let listed = storage.list_transactions().unwrap();
        assert_eq!(listed.len(), 3);
        // Newest first
        let listed_ids: Vec<Uuid> = listed.iter().map(|t| t.id).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(listed_ids, expected);
    }

    #[test]
    fn test_product_has_movements() {
        let (storage, _temp) = test_storage();
        let with_history = test_product("widget");
        let without_history = test_product("gadget");
        storage.insert_product(&with_history).unwrap();
        storage.insert_product(&without_history).unwrap();

        let transaction = test_transaction(TransactionKind::In, 1);
        let lines = vec![StockLine {
            transaction_id: transaction.id,
            product_id: with_history.id,
            quantity: 10,
        }];
        storage.append_transaction(&transaction, &lines).unwrap();

        assert!(storage.product_has_movements(with_history.id).unwrap());
        assert!(!storage.product_has_movements(without_history.id).unwrap());
    }

    #[test]
    fn test_unknown_transaction_lines_is_not_found() {
        let (storage, _temp) = test_storage();
        let result = storage.get_transaction_lines(Uuid::now_v7());
        assert!(matches!(result, Err(Error::TransactionNotFound(_))));
    }
}
