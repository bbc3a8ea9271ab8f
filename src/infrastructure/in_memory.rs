use super::locks::{LockSet, RowLocks};
use super::work::{ChangeSet, StoreWork, WorkBackend};
use super::{StoreOptions, newest_first, page};
use crate::domain::account::{Account, AccountId, AccountUpdate, DeletePolicy, NewAccount};
use crate::domain::country::{Country, CountryCode, CountryUpdate};
use crate::domain::entry::{Entry, EntryId};
use crate::domain::ports::{
    AccountRepository, CountryRepository, EntryRepository, LedgerStore, Page, TransferRepository,
    WorkHandle,
};
use crate::domain::transfer::{Transfer, TransferId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    countries: BTreeMap<CountryCode, Country>,
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

impl Tables {
    fn account_has_history(&self, id: AccountId) -> bool {
        self.entries.values().any(|entry| entry.account_id == id)
            || self.transfers.values().any(|transfer| transfer.involves(id))
    }
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
}

#[async_trait]
impl WorkBackend for Inner {
    async fn load_account(&self, id: AccountId) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    fn next_entry_id(&self) -> EntryId {
        self.entry_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn next_transfer_id(&self) -> TransferId {
        self.transfer_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Validate everything first so a failure leaves the tables untouched.
        if let Some(id) = changes
            .balances
            .keys()
            .find(|id| !tables.accounts.contains_key(id))
        {
            return Err(LedgerError::not_found("account", *id));
        }

        for (id, balance) in changes.balances {
            if let Some(account) = tables.accounts.get_mut(&id) {
                account.balance = balance;
            }
        }
        for entry in changes.entries {
            tables.entries.insert(entry.id, entry);
        }
        for transfer in changes.transfers {
            tables.transfers.insert(transfer.id, transfer);
        }
        Ok(())
    }
}

/// A thread-safe in-memory ledger.
///
/// All tables live behind one `tokio::sync::RwLock`; a commit applies its
/// whole change set under a single write guard, so readers never observe a
/// partially applied transfer. Row locks are independent of that guard and
/// are held for the lifetime of a unit of work.
#[derive(Clone)]
pub struct InMemoryLedger {
    inner: Arc<Inner>,
    locks: Arc<RowLocks>,
    options: StoreOptions,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger with default options.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            locks: RowLocks::new(),
            options,
        }
    }

    /// The row lock table, shared by every unit of work of this ledger.
    pub fn row_locks(&self) -> Arc<RowLocks> {
        self.locks.clone()
    }

    async fn lock_row(&self, id: AccountId) -> Result<LockSet> {
        let guard = LockSet::new(self.locks.clone());
        guard.acquire(id, self.options.lock_timeout).await?;
        Ok(guard)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<WorkHandle> {
        Ok(Box::new(StoreWork::new(
            self.inner.clone(),
            self.locks.clone(),
            self.options.lock_timeout,
        )))
    }
}

#[async_trait]
impl AccountRepository for InMemoryLedger {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        account.validate()?;
        let mut tables = self.inner.tables.write().await;
        if !tables.countries.contains_key(&account.country_code) {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "country {} does not exist",
                account.country_code
            )));
        }
        let id = self.inner.account_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let account = account.into_account(id);
        tables.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        let tables = self.inner.tables.read().await;
        tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn list_accounts(&self, window: Page) -> Result<Vec<Account>> {
        let tables = self.inner.tables.read().await;
        Ok(page(tables.accounts.values().cloned(), window))
    }

    async fn update_account(&self, id: AccountId, update: AccountUpdate) -> Result<Account> {
        let _row = self.lock_row(id).await?;
        let mut tables = self.inner.tables.write().await;
        if let Some(code) = update.country_code
            && !tables.countries.contains_key(&code)
        {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "country {code} does not exist"
            )));
        }
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("account", id))?;
        update.apply_to(account);
        Ok(account.clone())
    }

    async fn delete_account(&self, id: AccountId, policy: DeletePolicy) -> Result<()> {
        let _row = self.lock_row(id).await?;
        let mut tables = self.inner.tables.write().await;
        if !tables.accounts.contains_key(&id) {
            return Ok(());
        }
        if policy == DeletePolicy::Restrict && tables.account_has_history(id) {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "account {id} is referenced by entries or transfers"
            )));
        }
        tables.accounts.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl EntryRepository for InMemoryLedger {
    async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        let tables = self.inner.tables.read().await;
        tables
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries_by_account(&self, account_id: AccountId) -> Result<Vec<Entry>> {
        let tables = self.inner.tables.read().await;
        let mut entries: Vec<Entry> = tables
            .entries
            .values()
            .filter(|entry| entry.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| newest_first((a.created_at, a.id), (b.created_at, b.id)));
        Ok(entries)
    }

    async fn delete_entry(&self, id: EntryId) -> Result<()> {
        let mut tables = self.inner.tables.write().await;
        tables.entries.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TransferRepository for InMemoryLedger {
    async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        let tables = self.inner.tables.read().await;
        tables
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(&self) -> Result<Vec<Transfer>> {
        let tables = self.inner.tables.read().await;
        let mut transfers: Vec<Transfer> = tables.transfers.values().cloned().collect();
        transfers.sort_by(|a, b| newest_first((a.created_at, a.id), (b.created_at, b.id)));
        Ok(transfers)
    }

    async fn list_transfers_by_account(&self, account_id: AccountId) -> Result<Vec<Transfer>> {
        let tables = self.inner.tables.read().await;
        let mut transfers: Vec<Transfer> = tables
            .transfers
            .values()
            .filter(|transfer| transfer.involves(account_id))
            .cloned()
            .collect();
        transfers.sort_by(|a, b| newest_first((a.created_at, a.id), (b.created_at, b.id)));
        Ok(transfers)
    }

    async fn delete_transfer(&self, id: TransferId) -> Result<()> {
        let mut tables = self.inner.tables.write().await;
        tables.transfers.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CountryRepository for InMemoryLedger {
    async fn create_country(&self, country: Country) -> Result<Country> {
        let mut tables = self.inner.tables.write().await;
        if tables.countries.contains_key(&country.code) {
            return Err(LedgerError::AlreadyExists {
                entity: "country",
                key: country.code.into(),
            });
        }
        tables.countries.insert(country.code, country.clone());
        Ok(country)
    }

    async fn get_country(&self, code: CountryCode) -> Result<Country> {
        let tables = self.inner.tables.read().await;
        tables
            .countries
            .get(&code)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("country", code))
    }

    async fn list_countries(&self) -> Result<Vec<Country>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.countries.values().cloned().collect())
    }

    async fn update_country(&self, code: CountryCode, update: CountryUpdate) -> Result<Country> {
        let mut tables = self.inner.tables.write().await;
        let country = tables
            .countries
            .get_mut(&code)
            .ok_or_else(|| LedgerError::not_found("country", code))?;
        update.apply_to(country);
        Ok(country.clone())
    }

    async fn delete_country(&self, code: CountryCode) -> Result<()> {
        let mut tables = self.inner.tables.write().await;
        if tables
            .accounts
            .values()
            .any(|account| account.country_code == code)
        {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "country {code} is referenced by accounts"
            )));
        }
        tables.countries.remove(&code);
        Ok(())
    }
}
