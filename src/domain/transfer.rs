use crate::domain::account::AccountId;
use crate::domain::entry::Entry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TransferId = i64;

/// An immutable record of one completed movement of funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account_id == account_id || self.to_account_id == account_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTransfer {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

impl NewTransfer {
    pub(crate) fn into_transfer(self, id: TransferId) -> Transfer {
        Transfer {
            id,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
            created_at: Utc::now(),
        }
    }
}

/// A request to move `amount` from one account to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(rename = "from")]
    pub from_account_id: AccountId,
    #[serde(rename = "to")]
    pub to_account_id: AccountId,
    pub amount: i64,
}

impl TransferRequest {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// The two accounts in the order their row locks must be taken.
    ///
    /// The order depends only on the ids, never on the direction of the
    /// transfer, so `A -> B` and `B -> A` contend for the same first lock.
    pub fn lock_order(&self) -> [AccountId; 2] {
        let (from, to) = (self.from_account_id, self.to_account_id);
        if from <= to { [from, to] } else { [to, from] }
    }

    pub fn side_of(&self, account_id: AccountId) -> TransferSide {
        if account_id == self.from_account_id {
            TransferSide::Source
        } else {
            TransferSide::Destination
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSide {
    Source,
    Destination,
}

impl fmt::Display for TransferSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferSide::Source => f.write_str("source"),
            TransferSide::Destination => f.write_str("destination"),
        }
    }
}

/// Everything one committed transfer wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer: Transfer,
    pub entry_from: Entry,
    pub entry_to: Entry,
}
