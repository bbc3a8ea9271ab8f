use super::locks::{LockSet, RowLocks};
use crate::domain::account::{Account, AccountId};
use crate::domain::entry::{Entry, EntryId, NewEntry};
use crate::domain::ports::UnitOfWork;
use crate::domain::transfer::{NewTransfer, Transfer, TransferId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Writes buffered by a unit of work until commit.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub balances: BTreeMap<AccountId, i64>,
    pub entries: Vec<Entry>,
    pub transfers: Vec<Transfer>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.entries.is_empty() && self.transfers.is_empty()
    }
}

/// What a storage engine provides to run units of work on top of it.
#[async_trait]
pub(crate) trait WorkBackend: Send + Sync + 'static {
    /// Committed state of an account row.
    async fn load_account(&self, id: AccountId) -> Result<Option<Account>>;
    fn next_entry_id(&self) -> EntryId;
    fn next_transfer_id(&self) -> TransferId;
    /// Applies every change or none of them.
    async fn apply(&self, changes: ChangeSet) -> Result<()>;
}

/// A unit of work over any [`WorkBackend`].
pub(crate) struct StoreWork<B: WorkBackend> {
    backend: Arc<B>,
    locks: LockSet,
    lock_timeout: Duration,
    changes: ChangeSet,
    finished: bool,
}

impl<B: WorkBackend> StoreWork<B> {
    pub fn new(backend: Arc<B>, locks: Arc<RowLocks>, lock_timeout: Duration) -> Self {
        Self {
            backend,
            locks: LockSet::new(locks),
            lock_timeout,
            changes: ChangeSet::default(),
            finished: false,
        }
    }

    async fn existing_account(&self, id: AccountId) -> Result<Account> {
        self.backend
            .load_account(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    fn finish(&mut self) {
        self.finished = true;
        self.changes = ChangeSet::default();
        self.locks.release();
    }
}

#[async_trait]
impl<B: WorkBackend> UnitOfWork for StoreWork<B> {
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account> {
        self.locks.acquire(id, self.lock_timeout).await?;
        let mut account = self.existing_account(id).await?;
        if let Some(&balance) = self.changes.balances.get(&id) {
            account.balance = balance;
        }
        Ok(account)
    }

    async fn update_balance(&mut self, id: AccountId, balance: i64) -> Result<()> {
        if !self.locks.holds(id) {
            return Err(LedgerError::LockNotHeld(id));
        }
        self.changes.balances.insert(id, balance);
        Ok(())
    }

    async fn insert_entry(&mut self, entry: NewEntry) -> Result<Entry> {
        self.existing_account(entry.account_id).await?;
        let entry = entry.into_entry(self.backend.next_entry_id());
        self.changes.entries.push(entry.clone());
        Ok(entry)
    }

    async fn insert_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer> {
        self.existing_account(transfer.from_account_id).await?;
        self.existing_account(transfer.to_account_id).await?;
        let transfer = transfer.into_transfer(self.backend.next_transfer_id());
        self.changes.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut work = self;
        let changes = std::mem::take(&mut work.changes);
        let result = if changes.is_empty() {
            Ok(())
        } else {
            work.backend.apply(changes).await
        };
        work.finish();
        result
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut work = self;
        work.finish();
        Ok(())
    }
}

impl<B: WorkBackend> Drop for StoreWork<B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                owner = self.locks.owner(),
                pending_entries = self.changes.entries.len(),
                "unit of work dropped without commit, rolling back"
            );
        }
    }
}
