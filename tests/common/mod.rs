#![allow(dead_code)]

use bankledger::application::engine::TransferEngine;
use bankledger::domain::account::{AccountId, Currency, NewAccount};
use bankledger::domain::country::Country;
use bankledger::domain::ports::{AccountRepository, CountryRepository, LedgerBox};
use bankledger::infrastructure::in_memory::InMemoryLedger;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const HOME_COUNTRY: i32 = 1;

pub fn random_owner() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// A fresh in-memory ledger with one country and one USD account per
/// balance, numbered from 1 in the order given.
pub async fn seeded_ledger(balances: &[i64]) -> (InMemoryLedger, Vec<AccountId>) {
    let ledger = InMemoryLedger::new();
    ledger
        .create_country(Country {
            code: HOME_COUNTRY,
            name: Some("Freedonia".to_string()),
            continent_name: Some("Europe".to_string()),
        })
        .await
        .unwrap();

    let mut ids = Vec::with_capacity(balances.len());
    for balance in balances {
        let account = ledger
            .create_account(NewAccount {
                owner: random_owner(),
                balance: *balance,
                currency: Currency::Usd,
                country_code: HOME_COUNTRY,
            })
            .await
            .unwrap();
        ids.push(account.id);
    }
    (ledger, ids)
}

pub async fn seeded_engine(balances: &[i64]) -> (TransferEngine, InMemoryLedger, Vec<AccountId>) {
    let (ledger, ids) = seeded_ledger(balances).await;
    let boxed: LedgerBox = Arc::new(ledger.clone());
    (TransferEngine::new(boxed), ledger, ids)
}

/// Writes a transfers CSV of `rows` transfers of 1 between accounts 1 and 2,
/// alternating direction.
pub fn generate_transfers_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["from", "to", "amount"])?;
    for i in 0..rows {
        let (from, to) = if i % 2 == 0 { ("1", "2") } else { ("2", "1") };
        wtr.write_record([from, to, "1"])?;
    }

    wtr.flush()?;
    Ok(())
}
