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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// Column Family for country rows.
pub const CF_COUNTRIES: &str = "countries";
/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for entry rows.
pub const CF_ENTRIES: &str = "entries";
/// Column Family for transfer rows.
pub const CF_TRANSFERS: &str = "transfers";
/// Column Family for id sequences, keyed by the table they number.
pub const CF_META: &str = "meta";

struct Inner {
    db: DB,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
    /// Serializes writes that check a foreign key before writing.
    catalog: Mutex<()>,
    /// Orders commits so the persisted sequences never move backwards.
    commits: parking_lot::Mutex<()>,
}

impl Inner {
    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::store(format!("{name} column family not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    /// All rows of a column family in key order.
    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Highest id stored in a column family keyed by big-endian `i64`.
    fn last_id(&self, cf_name: &str) -> Result<i64> {
        let cf = self.cf(cf_name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _value) = item?;
                let bytes: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| LedgerError::store(format!("malformed key in {cf_name}")))?;
                Ok(i64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Sequence to resume from: the persisted high-water mark, or the
    /// highest stored key for a database written before sequences were kept.
    fn resume_seq(&self, table: &str) -> Result<AtomicI64> {
        let meta = self.cf(CF_META)?;
        let persisted = match self.db.get_cf(meta, table.as_bytes())? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::store(format!("malformed {table} sequence")))?;
                i64::from_be_bytes(bytes)
            }
            None => 0,
        };
        Ok(AtomicI64::new(persisted.max(self.last_id(table)?)))
    }

    /// Records `seq` as the high-water mark of `table` in `batch`.
    fn put_seq(&self, batch: &mut WriteBatch, table: &str, seq: &AtomicI64) -> Result<()> {
        let meta = self.cf(CF_META)?;
        batch.put_cf(meta, table.as_bytes(), seq.load(Ordering::SeqCst).to_be_bytes());
        Ok(())
    }

    fn account_has_history(&self, id: AccountId) -> Result<bool> {
        let entries: Vec<Entry> = self.scan_json(CF_ENTRIES)?;
        if entries.iter().any(|entry| entry.account_id == id) {
            return Ok(true);
        }
        let transfers: Vec<Transfer> = self.scan_json(CF_TRANSFERS)?;
        Ok(transfers.iter().any(|transfer| transfer.involves(id)))
    }
}

#[async_trait]
impl WorkBackend for Inner {
    async fn load_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, &id.to_be_bytes())
    }

    fn next_entry_id(&self) -> EntryId {
        self.entry_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_transfer_id(&self) -> TransferId {
        self.transfer_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut batch = WriteBatch::default();

        let accounts = self.cf(CF_ACCOUNTS)?;
        for (id, balance) in changes.balances {
            let key = id.to_be_bytes();
            let mut account: Account = self
                .get_json(CF_ACCOUNTS, &key)?
                .ok_or_else(|| LedgerError::not_found("account", id))?;
            account.balance = balance;
            batch.put_cf(accounts, key, serde_json::to_vec(&account)?);
        }

        let entries = self.cf(CF_ENTRIES)?;
        for entry in changes.entries {
            batch.put_cf(entries, entry.id.to_be_bytes(), serde_json::to_vec(&entry)?);
        }

        let transfers = self.cf(CF_TRANSFERS)?;
        for transfer in changes.transfers {
            batch.put_cf(
                transfers,
                transfer.id.to_be_bytes(),
                serde_json::to_vec(&transfer)?,
            );
        }

        let _order = self.commits.lock();
        self.put_seq(&mut batch, CF_ENTRIES, &self.entry_seq)?;
        self.put_seq(&mut batch, CF_TRANSFERS, &self.transfer_seq)?;
        self.db.write(batch)?;
        Ok(())
    }
}

/// A persistent ledger on RocksDB.
///
/// Each table lives in its own Column Family, keyed by the big-endian id and
/// holding the row as JSON. A commit is a single `WriteBatch`, which RocksDB
/// applies atomically. Id sequences are persisted with every insert, so ids of
/// deleted rows are never handed out again. Row locks are held in process, so one directory must
/// only be opened by one `RocksDBLedger` at a time (RocksDB enforces this with
/// its own file lock).
///
/// `Clone` shares the underlying database and lock table.
#[derive(Clone)]
pub struct RocksDBLedger {
    inner: Arc<Inner>,
    locks: Arc<RowLocks>,
    options: StoreOptions,
}

impl RocksDBLedger {
    /// Opens or creates a ledger at `path`, creating missing Column Families
    /// and resuming id sequences after the highest stored ids.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_COUNTRIES, CF_ACCOUNTS, CF_ENTRIES, CF_TRANSFERS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        let mut inner = Inner {
            db,
            account_seq: AtomicI64::new(0),
            entry_seq: AtomicI64::new(0),
            transfer_seq: AtomicI64::new(0),
            catalog: Mutex::new(()),
            commits: parking_lot::Mutex::new(()),
        };
        inner.account_seq = inner.resume_seq(CF_ACCOUNTS)?;
        inner.entry_seq = inner.resume_seq(CF_ENTRIES)?;
        inner.transfer_seq = inner.resume_seq(CF_TRANSFERS)?;

        Ok(Self {
            inner: Arc::new(inner),
            locks: RowLocks::new(),
            options,
        })
    }

    async fn lock_row(&self, id: AccountId) -> Result<LockSet> {
        let guard = LockSet::new(self.locks.clone());
        guard.acquire(id, self.options.lock_timeout).await?;
        Ok(guard)
    }

    fn country_exists(&self, code: CountryCode) -> Result<bool> {
        Ok(self
            .inner
            .get_json::<Country>(CF_COUNTRIES, &code.to_be_bytes())?
            .is_some())
    }
}

#[async_trait]
impl LedgerStore for RocksDBLedger {
    async fn begin(&self) -> Result<WorkHandle> {
        Ok(Box::new(StoreWork::new(
            self.inner.clone(),
            self.locks.clone(),
            self.options.lock_timeout,
        )))
    }
}

#[async_trait]
impl AccountRepository for RocksDBLedger {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        account.validate()?;
        let _catalog = self.inner.catalog.lock().await;
        if !self.country_exists(account.country_code)? {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "country {} does not exist",
                account.country_code
            )));
        }
        let id = self.inner.account_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let account = account.into_account(id);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.inner.cf(CF_ACCOUNTS)?,
            id.to_be_bytes(),
            serde_json::to_vec(&account)?,
        );
        self.inner
            .put_seq(&mut batch, CF_ACCOUNTS, &self.inner.account_seq)?;
        self.inner.db.write(batch)?;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.inner
            .get_json(CF_ACCOUNTS, &id.to_be_bytes())?
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn list_accounts(&self, window: Page) -> Result<Vec<Account>> {
        let accounts: Vec<Account> = self.inner.scan_json(CF_ACCOUNTS)?;
        Ok(page(accounts.into_iter(), window))
    }

    async fn update_account(&self, id: AccountId, update: AccountUpdate) -> Result<Account> {
        let _row = self.lock_row(id).await?;
        let _catalog = self.inner.catalog.lock().await;
        if let Some(code) = update.country_code
            && !self.country_exists(code)?
        {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "country {code} does not exist"
            )));
        }
        let mut account = self.get_account(id).await?;
        update.apply_to(&mut account);
        self.inner
            .put_json(CF_ACCOUNTS, &id.to_be_bytes(), &account)?;
        Ok(account)
    }

    async fn delete_account(&self, id: AccountId, policy: DeletePolicy) -> Result<()> {
        let _row = self.lock_row(id).await?;
        let _catalog = self.inner.catalog.lock().await;
        let key = id.to_be_bytes();
        if self.inner.get_json::<Account>(CF_ACCOUNTS, &key)?.is_none() {
            return Ok(());
        }
        if policy == DeletePolicy::Restrict && self.inner.account_has_history(id)? {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "account {id} is referenced by entries or transfers"
            )));
        }
        self.inner.delete(CF_ACCOUNTS, &key)
    }
}

#[async_trait]
impl EntryRepository for RocksDBLedger {
    async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        self.inner
            .get_json(CF_ENTRIES, &id.to_be_bytes())?
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries_by_account(&self, account_id: AccountId) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self
            .inner
            .scan_json::<Entry>(CF_ENTRIES)?
            .into_iter()
            .filter(|entry| entry.account_id == account_id)
            .collect();
        entries.sort_by(|a, b| newest_first((a.created_at, a.id), (b.created_at, b.id)));
        Ok(entries)
    }

    async fn delete_entry(&self, id: EntryId) -> Result<()> {
        self.inner.delete(CF_ENTRIES, &id.to_be_bytes())
    }
}

#[async_trait]
impl TransferRepository for RocksDBLedger {
    async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        self.inner
            .get_json(CF_TRANSFERS, &id.to_be_bytes())?
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(&self) -> Result<Vec<Transfer>> {
        let mut transfers: Vec<Transfer> = self.inner.scan_json(CF_TRANSFERS)?;
        transfers.sort_by(|a, b| newest_first((a.created_at, a.id), (b.created_at, b.id)));
        Ok(transfers)
    }

    async fn list_transfers_by_account(&self, account_id: AccountId) -> Result<Vec<Transfer>> {
        let mut transfers: Vec<Transfer> = self
            .inner
            .scan_json::<Transfer>(CF_TRANSFERS)?
            .into_iter()
            .filter(|transfer| transfer.involves(account_id))
            .collect();
        transfers.sort_by(|a, b| newest_first((a.created_at, a.id), (b.created_at, b.id)));
        Ok(transfers)
    }

    async fn delete_transfer(&self, id: TransferId) -> Result<()> {
        self.inner.delete(CF_TRANSFERS, &id.to_be_bytes())
    }
}

#[async_trait]
impl CountryRepository for RocksDBLedger {
    async fn create_country(&self, country: Country) -> Result<Country> {
        let _catalog = self.inner.catalog.lock().await;
        if self.country_exists(country.code)? {
            return Err(LedgerError::AlreadyExists {
                entity: "country",
                key: country.code.into(),
            });
        }
        self.inner
            .put_json(CF_COUNTRIES, &country.code.to_be_bytes(), &country)?;
        Ok(country)
    }

    async fn get_country(&self, code: CountryCode) -> Result<Country> {
        self.inner
            .get_json(CF_COUNTRIES, &code.to_be_bytes())?
            .ok_or_else(|| LedgerError::not_found("country", code))
    }

    async fn list_countries(&self) -> Result<Vec<Country>> {
        let mut countries: Vec<Country> = self.inner.scan_json(CF_COUNTRIES)?;
        countries.sort_by_key(|country| country.code);
        Ok(countries)
    }

    async fn update_country(&self, code: CountryCode, update: CountryUpdate) -> Result<Country> {
        let _catalog = self.inner.catalog.lock().await;
        let mut country = self.get_country(code).await?;
        update.apply_to(&mut country);
        self.inner
            .put_json(CF_COUNTRIES, &code.to_be_bytes(), &country)?;
        Ok(country)
    }

    async fn delete_country(&self, code: CountryCode) -> Result<()> {
        let _catalog = self.inner.catalog.lock().await;
        let accounts: Vec<Account> = self.inner.scan_json(CF_ACCOUNTS)?;
        if accounts.iter().any(|account| account.country_code == code) {
            return Err(LedgerError::ForeignKeyViolation(format!(
                "country {code} is referenced by accounts"
            )));
        }
        self.inner.delete(CF_COUNTRIES, &code.to_be_bytes())
    }
}
