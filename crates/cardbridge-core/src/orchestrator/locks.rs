//! Per-card commit locks.

use crate::models::CardId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<CardId, Arc<AsyncMutex<()>>>>>;

/// One async mutex per card, created on first use and dropped again when
/// the last holder or waiter lets go.
///
/// Holding a [`CardGuard`] also marks the card as in flight so state
/// listings can report it as migrating.
#[derive(Debug, Default)]
pub(crate) struct CardLocks {
    locks: LockMap,
    in_flight: Arc<Mutex<HashSet<CardId>>>,
}

impl CardLocks {
    pub(crate) async fn acquire(&self, card_id: CardId) -> CardGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(card_id)
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;

        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(card_id);

        CardGuard {
            card_id,
            locks: self.locks.clone(),
            in_flight: self.in_flight.clone(),
            guard,
        }
    }

    pub(crate) fn is_in_flight(&self, card_id: CardId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&card_id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) struct CardGuard {
    card_id: CardId,
    locks: LockMap,
    in_flight: Arc<Mutex<HashSet<CardId>>>,
    guard: OwnedMutexGuard<()>,
}

impl Drop for CardGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.card_id);

        // The map and this guard own one reference each; anything more is a waiter.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let held = OwnedMutexGuard::mutex(&self.guard);
        let idle = locks
            .get(&self.card_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, held) && Arc::strong_count(held) <= 2);
        if idle {
            locks.remove(&self.card_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_marks_in_flight() {
        let locks = CardLocks::default();
        {
            let _guard = locks.acquire(7).await;
            assert!(locks.is_in_flight(7));
            assert!(!locks.is_in_flight(8));
        }
        assert!(!locks.is_in_flight(7));
    }

    #[tokio::test]
    async fn test_second_acquire_waits() {
        let locks = Arc::new(CardLocks::default());
        let guard = locks.acquire(1).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_released_locks_are_removed() {
        let locks = CardLocks::default();
        for id in 0..50 {
            let _guard = locks.acquire(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }
}
