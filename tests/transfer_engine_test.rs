mod common;

use bankledger::domain::ports::{AccountRepository, EntryRepository, TransferRepository};
use bankledger::domain::transfer::TransferRequest;
use bankledger::error::LedgerError;
use common::seeded_engine;

#[tokio::test]
async fn test_receipt_matches_stored_rows() {
    let (engine, ledger, ids) = seeded_engine(&[1_000, 500]).await;
    let (a, b) = (ids[0], ids[1]);

    let receipt = engine
        .execute_transfer(TransferRequest::new(a, b, 300))
        .await
        .unwrap();

    assert_eq!(ledger.get_transfer(receipt.transfer.id).await.unwrap(), receipt.transfer);
    assert_eq!(ledger.get_entry(receipt.entry_from.id).await.unwrap(), receipt.entry_from);
    assert_eq!(ledger.get_entry(receipt.entry_to.id).await.unwrap(), receipt.entry_to);
    assert_eq!(receipt.entry_from.amount, -300);
    assert_eq!(receipt.entry_to.amount, 300);

    assert_eq!(ledger.list_transfers_by_account(a).await.unwrap().len(), 1);
    assert_eq!(ledger.list_transfers_by_account(b).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_same_direction() {
    let (engine, ledger, ids) = seeded_engine(&[1_000, 0]).await;
    let (a, b) = (ids[0], ids[1]);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.execute_transfer(TransferRequest::new(a, b, 10)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.get_account(a).await.unwrap().balance, 900);
    assert_eq!(ledger.get_account(b).await.unwrap().balance, 100);
    assert_eq!(ledger.list_transfers().await.unwrap().len(), 10);

    let entries_a = ledger.list_entries_by_account(a).await.unwrap();
    let entries_b = ledger.list_entries_by_account(b).await.unwrap();
    assert_eq!(entries_a.len() + entries_b.len(), 20);
    assert!(entries_a.iter().all(|entry| entry.amount == -10));
    assert!(entries_b.iter().all(|entry| entry.amount == 10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opposite_directions_do_not_deadlock() {
    let (engine, ledger, ids) = seeded_engine(&[1_000, 1_000]).await;
    let (a, b) = (ids[0], ids[1]);

    let mut handles = Vec::new();
    for i in 0..50 {
        let engine = engine.clone();
        let request = if i % 2 == 0 {
            TransferRequest::new(a, b, 10)
        } else {
            TransferRequest::new(b, a, 10)
        };
        handles.push(tokio::spawn(
            async move { engine.execute_transfer(request).await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.get_account(a).await.unwrap().balance, 1_000);
    assert_eq!(ledger.get_account(b).await.unwrap().balance, 1_000);
    assert_eq!(ledger.list_transfers().await.unwrap().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraft_is_never_lost() {
    let (engine, ledger, ids) = seeded_engine(&[100, 0]).await;
    let (a, b) = (ids[0], ids[1]);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.execute_transfer(TransferRequest::new(a, b, 10)).await
        }));
    }

    let mut committed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(LedgerError::InsufficientFunds { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(committed, 10);
    assert_eq!(rejected, 10);
    assert_eq!(ledger.get_account(a).await.unwrap().balance, 0);
    assert_eq!(ledger.get_account(b).await.unwrap().balance, 100);
    assert_eq!(ledger.list_transfers().await.unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transfer_ring_conserves_total() {
    let (engine, ledger, ids) = seeded_engine(&[500, 500, 500, 500]).await;

    let mut handles = Vec::new();
    for round in 0..40 {
        let from = ids[round % ids.len()];
        let to = ids[(round + 1) % ids.len()];
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.execute_transfer(TransferRequest::new(from, to, 25)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut total = 0;
    for id in &ids {
        let account = ledger.get_account(*id).await.unwrap();
        assert_eq!(account.balance, 500);
        total += account.balance;
    }
    assert_eq!(total, 2_000);
}

#[tokio::test]
async fn test_failed_transfer_leaves_no_trace() {
    let (engine, ledger, ids) = seeded_engine(&[700, 0]).await;
    let (a, b) = (ids[0], ids[1]);

    let result = engine.execute_transfer(TransferRequest::new(a, b, 2_000)).await;
    assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));

    assert_eq!(ledger.get_account(a).await.unwrap().balance, 700);
    assert_eq!(ledger.get_account(b).await.unwrap().balance, 0);
    assert!(ledger.list_transfers().await.unwrap().is_empty());
    assert!(ledger.list_entries_by_account(a).await.unwrap().is_empty());

    // Locks were released: a follow-up transfer goes through.
    engine
        .execute_transfer(TransferRequest::new(a, b, 700))
        .await
        .unwrap();
    assert_eq!(ledger.get_account(a).await.unwrap().balance, 0);
}
