//! Per-product serialization of conflicting ledger writes
//!
//! The original's OUT-validation read the projected stock and then
//! inserted the detail row as two separate steps, so two concurrent
//! stock-outs could both pass the sufficiency check against the same
//! snapshot. Here the check and the append run inside a critical
//! section per product: one async mutex per product ID, acquired for
//! every distinct product a transaction touches.
//!
//! Operations on disjoint product sets never contend. Operations with
//! overlapping sets are totally ordered. Locks are always taken in
//! sorted UUID order so two multi-product transactions cannot
//! deadlock, and every acquisition is bounded by a timeout.

use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

/// Lock table mapping product IDs to their write locks
pub struct ProductLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

impl ProductLocks {
    /// Create a lock table with the given per-acquisition timeout
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            lock_timeout,
        }
    }

    /// Acquire exclusivity over every product in `product_ids`
    ///
    /// The returned [`LockSet`] holds the locks until dropped. Waits
    /// longer than the configured timeout fail with
    /// [`Error::LockTimeout`] instead of queuing indefinitely.
    pub async fn acquire(&self, product_ids: &[Uuid]) -> Result<LockSet> {
        let mut ids: Vec<Uuid> = product_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for product_id in ids {
            // Clone the Arc out before awaiting; holding the map shard
            // guard across an await point would block other products.
            let lock = self.locks.entry(product_id).or_default().clone();

            let guard = timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| Error::LockTimeout { product_id })?;
            guards.push(guard);
        }

        Ok(LockSet { _guards: guards })
    }

    /// Drop the table entry for a product that no longer exists
    ///
    /// Waiters already holding a clone of the lock are unaffected;
    /// later acquirers get a fresh lock, which is fine once the
    /// product record itself is gone.
    pub fn evict(&self, product_id: Uuid) {
        self.locks.remove(&product_id);
    }
}

/// Held per-product locks; released on drop
pub struct LockSet {
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locks = ProductLocks::new(Duration::from_millis(100));
        let product = Uuid::new_v4();

        let held = locks.acquire(&[product]).await.unwrap();
        drop(held);

        // Reacquirable after release
        locks.acquire(&[product]).await.unwrap();
    }

    #[tokio::test]
    async fn test_contended_acquire_times_out() {
        let locks = ProductLocks::new(Duration::from_millis(50));
        let product = Uuid::new_v4();

        let _held = locks.acquire(&[product]).await.unwrap();

        let result = locks.acquire(&[product]).await;
        assert!(matches!(result, Err(Error::LockTimeout { product_id }) if product_id == product));
    }

    #[tokio::test]
    async fn test_disjoint_products_do_not_contend() {
        let locks = ProductLocks::new(Duration::from_millis(50));
        let widget = Uuid::new_v4();
        let gadget = Uuid::new_v4();

        let _held = locks.acquire(&[widget]).await.unwrap();

        // A different product acquires immediately
        locks.acquire(&[gadget]).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_ids_acquire_once() {
        let locks = ProductLocks::new(Duration::from_millis(50));
        let product = Uuid::new_v4();

        // Would deadlock against itself if duplicates were not deduped
        locks.acquire(&[product, product]).await.unwrap();
    }

    #[tokio::test]
    async fn test_evict_clears_the_table_entry() {
        let locks = ProductLocks::new(Duration::from_millis(50));
        let product = Uuid::new_v4();

        drop(locks.acquire(&[product]).await.unwrap());
        assert_eq!(locks.locks.len(), 1);

        locks.evict(product);
        assert!(locks.locks.is_empty());

        // Reacquirable with a fresh entry
        locks.acquire(&[product]).await.unwrap();
        assert_eq!(locks.locks.len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_sets_are_serialized() {
        let locks = Arc::new(ProductLocks::new(Duration::from_millis(500)));
        let shared = Uuid::new_v4();
        let other = Uuid::new_v4();

        let held = locks.acquire(&[shared, other]).await.unwrap();

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move { locks2.acquire(&[shared]).await });

        // Give the waiter time to block, then release
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        waiter.await.unwrap().unwrap();
    }
}
