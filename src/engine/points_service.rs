use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::{BalanceCalculator, SpendAllocator, TransactionRecorder};
use crate::models::{Balances, ErrorClass, LedgerError, SpendingDetail, Transaction};
use crate::storage::{LedgerSession, LedgerStore};
use crate::types::Points;

/// The ledger's public operations. Each call runs in exactly one session and
/// either commits everything it did or nothing.
pub struct PointsService<S: LedgerStore> {
    store: Arc<S>,
    lock_timeout: Duration
}

impl<S: LedgerStore> PointsService<S> {
    pub fn new(store: Arc<S>, lock_timeout: Duration) -> Self {
        Self { store, lock_timeout }
    }

    /// Records an earn, or applies a correction when `points` is negative.
    pub async fn add(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let mut session = self.begin().await?;

        let debited = TransactionRecorder::record_earn(&mut session, transaction, Utc::now())
            .inspect_err(log_rejection)?;

        session.commit()?;

        info!("Recorded [{}] points for payer [{}]", transaction.points, transaction.payer);

        if !debited.is_empty() {
            debug!("Correction debited {debited:?}");
        }

        Ok(())
    }

    /// Spends `amount` points oldest first and reports what each payer paid.
    pub async fn spend(&self, amount: Points) -> Result<Vec<SpendingDetail>, LedgerError> {
        let mut session = self.begin().await?;

        let allocation = SpendAllocator::allocate(&session, amount)
            .inspect_err(log_rejection)?;

        if allocation.is_empty() {
            return Ok(Vec::new());
        }

        TransactionRecorder::record_spend(&mut session, &allocation, Utc::now())?;
        session.commit()?;

        info!("Spent [{amount}] points across [{}] payers", allocation.details.len());

        Ok(allocation.details)
    }

    pub async fn balance(&self) -> Result<Balances, LedgerError> {
        let session = self.begin().await?;

        BalanceCalculator::balance(&session)
    }

    async fn begin(&self) -> Result<S::Session, LedgerError> {
        timeout(self.lock_timeout, self.store.begin()).await
            .map_err(|_| LedgerError::storage("begin", format!("ledger was busy for longer than {:?}", self.lock_timeout)))?
    }
}

fn log_rejection(error: &LedgerError) {
    if error.class() == ErrorClass::BadRequest {
        warn!("{error}");
    }
}
