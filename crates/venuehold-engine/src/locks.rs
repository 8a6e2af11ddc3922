use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use venuehold_core::slot::SlotKey;

/// One async mutex per slot, created on first use.
#[derive(Default)]
pub(crate) struct SlotLocks {
  inner: DashMap<SlotKey, Arc<Mutex<()>>>,
}

impl SlotLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `slot`. The map shard is released before
  /// awaiting, so waiting on one slot never blocks another.
  pub async fn acquire(&self, slot: SlotKey) -> OwnedMutexGuard<()> {
    let lock = self.inner.entry(slot).or_default().clone();
    lock.lock_owned().await
  }

  /// Drop locks nobody holds or waits on. Returns how many were dropped.
  pub fn prune(&self) -> usize {
    let before = self.inner.len();
    self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
    before.saturating_sub(self.inner.len())
  }

  pub fn len(&self) -> usize { self.inner.len() }
}
