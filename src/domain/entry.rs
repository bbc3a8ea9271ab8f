use crate::domain::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EntryId = i64;

/// An immutable audit row: one signed balance change on one account.
/// Positive amounts are credits, negative amounts debits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub amount: i64,
}

impl NewEntry {
    pub(crate) fn into_entry(self, id: EntryId) -> Entry {
        Entry {
            id,
            account_id: self.account_id,
            amount: self.amount,
            created_at: Utc::now(),
        }
    }
}
