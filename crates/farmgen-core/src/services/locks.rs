use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-product mutual exclusion for generate/save operations.
///
/// Holds one async mutex per product id that currently has a holder or
/// waiter; idle slots are dropped on the next acquisition.
#[derive(Debug, Default)]
pub struct ProductLocks {
    slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other operation holds `product_id`.
    pub async fn acquire(&self, product_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(product_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of products with a live slot.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_product_is_serialized() {
        let locks = Arc::new(ProductLocks::new());
        let inside = Arc::new(AtomicU32::new(0));
        let id = Uuid::new_v4();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_products_do_not_block() {
        let locks = ProductLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4()))
            .await
            .expect("second product should not wait");
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_slots_are_reclaimed() {
        let locks = ProductLocks::new();
        drop(locks.acquire(Uuid::new_v4()).await);
        let _held = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.slots.lock().unwrap().len(), 1);
    }
}
