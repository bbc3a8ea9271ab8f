use crate::domain::account::{Account, AccountId, Amount};
use crate::domain::entry::NewEntry;
use crate::domain::ports::{AccountRepository, LedgerBox, LedgerStore, UnitOfWork};
use crate::domain::transfer::{NewTransfer, TransferReceipt, TransferRequest};
use crate::error::{LedgerError, Result};
use std::time::Duration;

/// Engine-level knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Deadline for a whole transfer, lock waits included. `None` leaves the
    /// wait bounded only by the store's lock timeout.
    pub transfer_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            transfer_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Executes money transfers.
///
/// Every transfer runs in its own unit of work. The engine keeps no in-process
/// lock of its own: isolation comes from the store's row locks, taken in
/// ascending account id order so that concurrent transfers over the same pair
/// of accounts queue up instead of deadlocking. Failed transfers are never
/// retried here; callers check [`LedgerError::is_transient`].
#[derive(Clone)]
pub struct TransferEngine {
    ledger: LedgerBox,
    options: EngineOptions,
}

impl TransferEngine {
    /// Creates a new `TransferEngine` over a ledger backend.
    pub fn new(ledger: LedgerBox) -> Self {
        Self::with_options(ledger, EngineOptions::default())
    }

    pub fn with_options(ledger: LedgerBox, options: EngineOptions) -> Self {
        Self { ledger, options }
    }

    /// The ledger this engine writes to, for reads and administration.
    pub fn ledger(&self) -> &LedgerBox {
        &self.ledger
    }

    /// Moves `request.amount` from one account to another, atomically.
    ///
    /// On success the source balance has dropped by exactly `amount`, the
    /// destination balance has grown by exactly `amount`, and one transfer
    /// plus two entries (`-amount`, `+amount`) were written. On failure
    /// nothing was written.
    pub async fn execute_transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        match self.options.transfer_timeout {
            Some(limit) => self.execute_transfer_within(request, limit).await,
            None => self.run(request).await,
        }
    }

    /// Like [`execute_transfer`](Self::execute_transfer) with an explicit
    /// deadline. When it expires the in-flight unit of work is dropped, which
    /// rolls it back and releases its row locks.
    pub async fn execute_transfer_within(
        &self,
        request: TransferRequest,
        limit: Duration,
    ) -> Result<TransferReceipt> {
        tokio::time::timeout(limit, self.run(request))
            .await
            .map_err(|_| LedgerError::Timeout(limit))?
    }

    #[tracing::instrument(
        name = "transfer",
        skip(self),
        fields(
            from = request.from_account_id,
            to = request.to_account_id,
            amount = request.amount
        )
    )]
    async fn run(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let amount = match self.validate(&request).await {
            Ok(amount) => amount,
            Err(err) => {
                tracing::warn!(error = %err, "transfer rejected");
                return Err(err);
            }
        };

        let mut work = self.ledger.begin().await?;
        match Self::apply(work.as_mut(), &request, amount).await {
            Ok(receipt) => {
                work.commit().await?;
                tracing::info!(transfer = receipt.transfer.id, "transfer committed");
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback_err) = work.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                tracing::warn!(error = %err, "transfer rolled back");
                Err(err)
            }
        }
    }

    /// Checks that need no lock: amount, direction, existence.
    async fn validate(&self, request: &TransferRequest) -> Result<Amount> {
        let amount = Amount::new(request.amount)?;
        if request.from_account_id == request.to_account_id {
            return Err(LedgerError::SameAccountTransfer(request.from_account_id));
        }
        for id in [request.from_account_id, request.to_account_id] {
            self.ledger
                .get_account(id)
                .await
                .map_err(|err| Self::name_side(err, request, id))?;
        }
        Ok(amount)
    }

    async fn apply(
        work: &mut dyn UnitOfWork,
        request: &TransferRequest,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let [first, second] = request.lock_order();
        let first = Self::lock_account(work, request, first).await?;
        let second = Self::lock_account(work, request, second).await?;
        let (mut source, mut destination) = if first.id == request.from_account_id {
            (first, second)
        } else {
            (second, first)
        };

        if source.currency != destination.currency {
            return Err(LedgerError::CurrencyMismatch {
                from: source.currency,
                to: destination.currency,
            });
        }

        source.withdraw(amount)?;
        destination.deposit(amount)?;
        work.update_balance(source.id, source.balance).await?;
        work.update_balance(destination.id, destination.balance)
            .await?;

        let entry_from = work
            .insert_entry(NewEntry {
                account_id: source.id,
                amount: -amount.value(),
            })
            .await?;
        let entry_to = work
            .insert_entry(NewEntry {
                account_id: destination.id,
                amount: amount.value(),
            })
            .await?;
        let transfer = work
            .insert_transfer(NewTransfer {
                from_account_id: source.id,
                to_account_id: destination.id,
                amount: amount.value(),
            })
            .await?;

        Ok(TransferReceipt {
            transfer,
            entry_from,
            entry_to,
        })
    }

    async fn lock_account(
        work: &mut dyn UnitOfWork,
        request: &TransferRequest,
        id: AccountId,
    ) -> Result<Account> {
        work.get_account_for_update(id)
            .await
            .map_err(|err| Self::name_side(err, request, id))
    }

    fn name_side(err: LedgerError, request: &TransferRequest, id: AccountId) -> LedgerError {
        match err {
            LedgerError::NotFound {
                entity: "account", ..
            } => LedgerError::AccountNotFound {
                side: request.side_of(id),
                id,
            },
            other => other,
        }
    }
}
