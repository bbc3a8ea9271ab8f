//! Exclusive row locks on accounts.
//!
//! Every unit of work gets an owner id and takes locks through a [`LockSet`].
//! A lock is held until the owning `LockSet` releases it or is dropped, so a
//! unit of work abandoned on any path gives its rows back.
//!
//! Waiting is bounded: a zero wait fails at once with `Busy`, an expired wait
//! fails with `Timeout`, and a wait that would close a cycle in the
//! wait-for graph fails with `Deadlock` before sleeping.

use crate::domain::account::AccountId;
use crate::error::{LedgerError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub type OwnerId = u64;

#[derive(Default)]
struct LockTable {
    holders: HashMap<AccountId, OwnerId>,
    waiting: HashMap<OwnerId, AccountId>,
}

impl LockTable {
    /// Whether `owner` waiting on a row held by `holder` would close a cycle.
    fn closes_cycle(&self, owner: OwnerId, holder: OwnerId) -> bool {
        let mut current = holder;
        for _ in 0..=self.waiting.len() {
            if current == owner {
                return true;
            }
            let Some(row) = self.waiting.get(&current) else {
                return false;
            };
            let Some(&next) = self.holders.get(row) else {
                return false;
            };
            current = next;
        }
        false
    }
}

#[derive(Default)]
pub struct RowLocks {
    table: Mutex<LockTable>,
    released: Notify,
    next_owner: AtomicU64,
}

impl RowLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register_owner(&self) -> OwnerId {
        self.next_owner.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn acquire(&self, owner: OwnerId, row: AccountId, wait: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(wait);
        loop {
            let released = {
                let mut table = self.table.lock();
                match table.holders.get(&row).copied() {
                    None => {
                        table.holders.insert(row, owner);
                        table.waiting.remove(&owner);
                        return Ok(());
                    }
                    Some(holder) if holder == owner => return Ok(()),
                    Some(holder) => {
                        if wait.is_zero() {
                            return Err(LedgerError::Busy(row));
                        }
                        if table.closes_cycle(owner, holder) {
                            table.waiting.remove(&owner);
                            return Err(LedgerError::Deadlock(row));
                        }
                        table.waiting.insert(owner, row);
                        tracing::debug!(account = row, owner, holder, "waiting for row lock");
                        // Registered before the table is unlocked, so a release
                        // between here and the await still wakes us.
                        self.released.notified()
                    }
                }
            };

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        self.table.lock().waiting.remove(&owner);
                        return Err(LedgerError::Timeout(wait));
                    }
                }
                None => released.await,
            }
        }
    }

    fn holds(&self, owner: OwnerId, row: AccountId) -> bool {
        self.table.lock().holders.get(&row) == Some(&owner)
    }

    fn release_all(&self, owner: OwnerId) {
        {
            let mut table = self.table.lock();
            table.holders.retain(|_, holder| *holder != owner);
            table.waiting.remove(&owner);
        }
        self.released.notify_waiters();
    }

    /// Current holder of a row, if any.
    pub fn holder(&self, row: AccountId) -> Option<OwnerId> {
        self.table.lock().holders.get(&row).copied()
    }

    /// Row `owner` is currently blocked on, if any.
    pub fn waiting_on(&self, owner: OwnerId) -> Option<AccountId> {
        self.table.lock().waiting.get(&owner).copied()
    }
}

/// The locks held by one owner. Dropping it releases all of them.
pub struct LockSet {
    locks: Arc<RowLocks>,
    owner: OwnerId,
}

impl LockSet {
    pub fn new(locks: Arc<RowLocks>) -> Self {
        let owner = locks.register_owner();
        Self { locks, owner }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Locks `row`, waiting at most `wait`. Re-locking a held row is a no-op.
    pub async fn acquire(&self, row: AccountId, wait: Duration) -> Result<()> {
        self.locks.acquire(self.owner, row, wait).await
    }

    pub fn holds(&self, row: AccountId) -> bool {
        self.locks.holds(self.owner, row)
    }

    pub fn release(&self) {
        self.locks.release_all(self.owner);
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.locks.release_all(self.owner);
    }
}
