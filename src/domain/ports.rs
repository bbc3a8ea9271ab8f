use super::account::{Account, AccountId, AccountUpdate, DeletePolicy, NewAccount};
use super::country::{Country, CountryCode, CountryUpdate};
use super::entry::{Entry, EntryId, NewEntry};
use super::transfer::{NewTransfer, Transfer, TransferId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::all()
    }
}

/// An atomic, isolated group of store operations.
///
/// Writes are buffered and become visible together on [`UnitOfWork::commit`].
/// Dropping a handle without committing rolls it back and releases every row
/// lock it holds.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks the account row for the rest of the unit of work and reads it,
    /// including any balance this unit of work already wrote.
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account>;

    /// Writes a new balance. The row must be locked by this unit of work.
    async fn update_balance(&mut self, id: AccountId, balance: i64) -> Result<()>;

    async fn insert_entry(&mut self, entry: NewEntry) -> Result<Entry>;

    async fn insert_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub type WorkHandle = Box<dyn UnitOfWork>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<WorkHandle>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create_account(&self, account: NewAccount) -> Result<Account>;
    async fn get_account(&self, id: AccountId) -> Result<Account>;
    async fn list_accounts(&self, page: Page) -> Result<Vec<Account>>;
    async fn update_account(&self, id: AccountId, update: AccountUpdate) -> Result<Account>;
    async fn delete_account(&self, id: AccountId, policy: DeletePolicy) -> Result<()>;
}

#[async_trait]
pub trait EntryRepository: Send + Sync {
    async fn get_entry(&self, id: EntryId) -> Result<Entry>;
    /// Newest first.
    async fn list_entries_by_account(&self, account_id: AccountId) -> Result<Vec<Entry>>;
    async fn delete_entry(&self, id: EntryId) -> Result<()>;
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn get_transfer(&self, id: TransferId) -> Result<Transfer>;
    /// Newest first.
    async fn list_transfers(&self) -> Result<Vec<Transfer>>;
    /// Transfers with `account_id` on either side, newest first.
    async fn list_transfers_by_account(&self, account_id: AccountId) -> Result<Vec<Transfer>>;
    async fn delete_transfer(&self, id: TransferId) -> Result<()>;
}

#[async_trait]
pub trait CountryRepository: Send + Sync {
    async fn create_country(&self, country: Country) -> Result<Country>;
    async fn get_country(&self, code: CountryCode) -> Result<Country>;
    async fn list_countries(&self) -> Result<Vec<Country>>;
    async fn update_country(&self, code: CountryCode, update: CountryUpdate) -> Result<Country>;
    async fn delete_country(&self, code: CountryCode) -> Result<()>;
}

/// A complete ledger backend.
pub trait Ledger:
    LedgerStore + AccountRepository + EntryRepository + TransferRepository + CountryRepository
{
}

impl<T> Ledger for T where
    T: LedgerStore + AccountRepository + EntryRepository + TransferRepository + CountryRepository
{
}

pub type LedgerBox = Arc<dyn Ledger>;
