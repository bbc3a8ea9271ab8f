use crate::domain::account::{AccountId, Currency};
use crate::domain::transfer::TransferSide;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Amount must be strictly positive, got {0}")]
    InvalidAmount(i64),
    #[error("Account {0} cannot transfer to itself")]
    SameAccountTransfer(AccountId),
    #[error("The {side} account {id} does not exist")]
    AccountNotFound { side: TransferSide, id: AccountId },
    #[error("Account {account} holds {balance}, cannot debit {amount}")]
    InsufficientFunds {
        account: AccountId,
        balance: i64,
        amount: i64,
    },
    #[error("Cannot move {from} into a {to} account")]
    CurrencyMismatch { from: Currency, to: Currency },
    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),
    #[error("No {entity} with key {key}")]
    NotFound { entity: &'static str, key: i64 },
    #[error("A {entity} with key {key} already exists")]
    AlreadyExists { entity: &'static str, key: i64 },
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("Account {0} is not locked by this unit of work")]
    LockNotHeld(AccountId),
    #[error("Account {0} is locked by another unit of work")]
    Busy(AccountId),
    #[error("Deadlock detected while locking account {0}")]
    Deadlock(AccountId),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Store failure: {0}")]
    StoreFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub(crate) fn not_found(entity: &'static str, key: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub(crate) fn store(message: impl Into<String>) -> Self {
        Self::StoreFailure(message.into().into())
    }

    /// Contention signals a caller may retry with the same parameters.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Deadlock(_) | Self::Timeout(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::StoreFailure(Box::new(err))
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
