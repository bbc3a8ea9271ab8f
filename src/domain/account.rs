use crate::domain::country::CountryCode;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AccountId = i64;

/// A positive amount of money in the smallest currency unit.
///
/// Transfers can only be built from an `Amount`, so a zero or negative
/// movement of funds is unrepresentable past validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(LedgerError::InvalidAmount(value))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Cad,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
        };
        f.write_str(code)
    }
}

/// A ledger account.
///
/// `balance` only changes through [`Account::withdraw`] and
/// [`Account::deposit`] inside a unit of work holding the account's row lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    /// Balance in the smallest currency unit.
    pub balance: i64,
    pub currency: Currency,
    pub country_code: CountryCode,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Debits the account if the balance covers `amount`.
    pub fn withdraw(&mut self, amount: Amount) -> Result<()> {
        if self.balance >= amount.value() {
            self.balance -= amount.value();
            Ok(())
        } else {
            Err(LedgerError::InsufficientFunds {
                account: self.id,
                balance: self.balance,
                amount: amount.value(),
            })
        }
    }

    /// Credits the account.
    pub fn deposit(&mut self, amount: Amount) -> Result<()> {
        self.balance = self
            .balance
            .checked_add(amount.value())
            .ok_or(LedgerError::BalanceOverflow(self.id))?;
        Ok(())
    }
}

/// Fields supplied by the caller when opening an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub owner: String,
    /// Opening balance, never negative.
    pub balance: i64,
    pub currency: Currency,
    pub country_code: CountryCode,
}

impl NewAccount {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.balance < 0 {
            return Err(LedgerError::InvalidAmount(self.balance));
        }
        Ok(())
    }

    pub(crate) fn into_account(self, id: AccountId) -> Account {
        Account {
            id,
            owner: self.owner,
            balance: self.balance,
            currency: self.currency,
            country_code: self.country_code,
            created_at: Utc::now(),
        }
    }
}

/// Non-balance fields an administrator may change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub owner: Option<String>,
    pub currency: Option<Currency>,
    pub country_code: Option<CountryCode>,
}

impl AccountUpdate {
    pub(crate) fn apply_to(self, account: &mut Account) {
        if let Some(owner) = self.owner {
            account.owner = owner;
        }
        if let Some(currency) = self.currency {
            account.currency = currency;
        }
        if let Some(country_code) = self.country_code {
            account.country_code = country_code;
        }
    }
}

/// How `delete_account` treats an account that still has history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Refuse to delete an account referenced by entries or transfers.
    #[default]
    Restrict,
    /// Administrative override: remove the account row, keep its history.
    Override,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i64) -> Account {
        NewAccount {
            owner: "alice".to_string(),
            balance,
            currency: Currency::Usd,
            country_code: 1,
        }
        .into_account(1)
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(1).is_ok());
        assert!(matches!(Amount::new(0), Err(LedgerError::InvalidAmount(0))));
        assert!(matches!(
            Amount::new(-1),
            Err(LedgerError::InvalidAmount(-1))
        ));
    }

    #[test]
    fn test_account_withdraw_success() {
        let mut account = account(10);
        account.withdraw(Amount::new(4).unwrap()).unwrap();
        assert_eq!(account.balance, 6);
    }

    #[test]
    fn test_account_withdraw_exact_balance() {
        let mut account = account(10);
        account.withdraw(Amount::new(10).unwrap()).unwrap();
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn test_account_withdraw_insufficient() {
        let mut account = account(10);
        let result = account.withdraw(Amount::new(11).unwrap());
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds {
                account: 1,
                balance: 10,
                amount: 11
            })
        ));
        assert_eq!(account.balance, 10);
    }

    #[test]
    fn test_account_deposit_overflow() {
        let mut account = account(i64::MAX);
        let result = account.deposit(Amount::new(1).unwrap());
        assert!(matches!(result, Err(LedgerError::BalanceOverflow(1))));
        assert_eq!(account.balance, i64::MAX);
    }

    #[test]
    fn test_currency_serialization() {
        let json = serde_json::to_string(&Currency::Eur).unwrap();
        assert_eq!(json, "\"EUR\"");
        assert_eq!(Currency::Cad.to_string(), "CAD");
    }

    #[test]
    fn test_negative_opening_balance_rejected() {
        let new = NewAccount {
            owner: "bob".to_string(),
            balance: -5,
            currency: Currency::Usd,
            country_code: 1,
        };
        assert!(matches!(new.validate(), Err(LedgerError::InvalidAmount(-5))));
    }

    #[test]
    fn test_update_leaves_balance_alone() {
        let mut account = account(250);
        AccountUpdate {
            owner: Some("carol".to_string()),
            currency: Some(Currency::Cad),
            country_code: None,
        }
        .apply_to(&mut account);
        assert_eq!(account.owner, "carol");
        assert_eq!(account.currency, Currency::Cad);
        assert_eq!(account.country_code, 1);
        assert_eq!(account.balance, 250);
    }
}
