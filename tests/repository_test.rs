mod common;

use bankledger::domain::account::{AccountUpdate, Currency, DeletePolicy};
use bankledger::domain::country::{Country, CountryUpdate};
use bankledger::domain::ports::{
    AccountRepository, CountryRepository, EntryRepository, Page, TransferRepository,
};
use bankledger::domain::transfer::TransferRequest;
use bankledger::error::LedgerError;
use common::{HOME_COUNTRY, seeded_engine, seeded_ledger};

#[tokio::test]
async fn test_country_crud() {
    let (ledger, _) = seeded_ledger(&[]).await;

    let duplicate = ledger
        .create_country(Country {
            code: HOME_COUNTRY,
            name: None,
            continent_name: None,
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(LedgerError::AlreadyExists { entity: "country", .. })
    ));

    ledger
        .create_country(Country {
            code: 2,
            name: None,
            continent_name: None,
        })
        .await
        .unwrap();
    let updated = ledger
        .update_country(
            2,
            CountryUpdate {
                name: Some("Sylvania".to_string()),
                continent_name: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Sylvania"));
    assert_eq!(ledger.list_countries().await.unwrap().len(), 2);

    ledger.delete_country(2).await.unwrap();
    ledger.delete_country(2).await.unwrap();
    assert!(matches!(
        ledger.get_country(2).await,
        Err(LedgerError::NotFound { entity: "country", .. })
    ));
}

#[tokio::test]
async fn test_country_in_use_cannot_be_deleted() {
    let (ledger, _) = seeded_ledger(&[10]).await;
    assert!(matches!(
        ledger.delete_country(HOME_COUNTRY).await,
        Err(LedgerError::ForeignKeyViolation(_))
    ));
}

#[tokio::test]
async fn test_update_account_keeps_balance() {
    let (ledger, ids) = seeded_ledger(&[250]).await;

    let updated = ledger
        .update_account(
            ids[0],
            AccountUpdate {
                owner: Some("renamed".to_string()),
                currency: Some(Currency::Cad),
                country_code: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.owner, "renamed");
    assert_eq!(updated.currency, Currency::Cad);
    assert_eq!(updated.balance, 250);

    let bad_country = ledger
        .update_account(
            ids[0],
            AccountUpdate {
                country_code: Some(42),
                ..AccountUpdate::default()
            },
        )
        .await;
    assert!(matches!(bad_country, Err(LedgerError::ForeignKeyViolation(_))));
}

#[tokio::test]
async fn test_list_accounts_pages_by_id() {
    let (ledger, ids) = seeded_ledger(&[1, 2, 3, 4, 5]).await;

    let second_page = ledger.list_accounts(Page::new(2, 2)).await.unwrap();
    let page_ids: Vec<_> = second_page.iter().map(|account| account.id).collect();
    assert_eq!(page_ids, vec![ids[2], ids[3]]);

    assert_eq!(ledger.list_accounts(Page::all()).await.unwrap().len(), 5);
    assert!(ledger.list_accounts(Page::new(10, 5)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listings_are_newest_first() {
    let (engine, ledger, ids) = seeded_engine(&[100, 100, 100]).await;

    let first = engine
        .execute_transfer(TransferRequest::new(ids[0], ids[1], 1))
        .await
        .unwrap();
    let second = engine
        .execute_transfer(TransferRequest::new(ids[2], ids[0], 2))
        .await
        .unwrap();

    let transfers = ledger.list_transfers_by_account(ids[0]).await.unwrap();
    assert_eq!(transfers, vec![second.transfer.clone(), first.transfer.clone()]);

    let entries = ledger.list_entries_by_account(ids[0]).await.unwrap();
    assert_eq!(entries, vec![second.entry_to, first.entry_from]);

    let for_middle = ledger.list_transfers_by_account(ids[1]).await.unwrap();
    assert_eq!(for_middle, vec![first.transfer]);
}

#[tokio::test]
async fn test_history_deletes_are_idempotent() {
    let (engine, ledger, ids) = seeded_engine(&[100, 0]).await;
    let receipt = engine
        .execute_transfer(TransferRequest::new(ids[0], ids[1], 40))
        .await
        .unwrap();

    ledger.delete_transfer(receipt.transfer.id).await.unwrap();
    ledger.delete_transfer(receipt.transfer.id).await.unwrap();
    ledger.delete_entry(receipt.entry_from.id).await.unwrap();
    ledger.delete_entry(receipt.entry_from.id).await.unwrap();

    assert!(matches!(
        ledger.get_transfer(receipt.transfer.id).await,
        Err(LedgerError::NotFound { entity: "transfer", .. })
    ));
    assert_eq!(ledger.list_entries_by_account(ids[1]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_account_with_history_needs_override() {
    let (engine, ledger, ids) = seeded_engine(&[100, 0]).await;
    engine
        .execute_transfer(TransferRequest::new(ids[0], ids[1], 40))
        .await
        .unwrap();

    assert!(matches!(
        ledger.delete_account(ids[0], DeletePolicy::Restrict).await,
        Err(LedgerError::ForeignKeyViolation(_))
    ));

    ledger
        .delete_account(ids[0], DeletePolicy::Override)
        .await
        .unwrap();
    assert!(ledger.get_account(ids[0]).await.is_err());
    // History survives the account row.
    assert_eq!(ledger.list_transfers().await.unwrap().len(), 1);

    // Transfers naming the removed account now fail up front.
    let result = engine
        .execute_transfer(TransferRequest::new(ids[1], ids[0], 1))
        .await;
    assert!(matches!(result, Err(LedgerError::AccountNotFound { .. })));
}
