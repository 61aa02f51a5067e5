use chrono::{DateTime, Utc};

use crate::engine::{Allocation, SpendAllocator};
use crate::models::{LedgerError, SpendingDetail, Transaction};
use crate::storage::LedgerSession;

/// Stages earns and spends on a session. The caller commits.
pub struct TransactionRecorder;

impl TransactionRecorder {
    /// Writes one negative audit row per payer and the new remaining points of every touched transaction.
    pub fn record_spend<L: LedgerSession>(session: &mut L, allocation: &Allocation, timestamp: DateTime<Utc>) -> Result<(), LedgerError> {
        for detail in &allocation.details {
            session.insert(&detail.payer, detail.points, timestamp)?;
        }

        session.update_remaining(&allocation.updated_remaining)
    }

    /// Writes an earn. A negative earn is a correction and is debited like a spend
    /// of the same size, stamped `now`.
    ///
    /// # Errors
    /// Returns `LedgerError::BalanceOverflow` if the earn would push the payer's
    /// balance past `Points::MAX`; nothing is staged in that case.
    /// Returns `LedgerError::InvalidCorrection` if the ledger cannot cover the
    /// correction. The session then holds a partial write and must be dropped.
    pub fn record_earn<L: LedgerSession>(session: &mut L, transaction: &Transaction, now: DateTime<Utc>) -> Result<Vec<SpendingDetail>, LedgerError> {
        if transaction.points > 0 {
            let balance = session.aggregate_balances()?
                .get(&transaction.payer)
                .copied()
                .unwrap_or(0);

            balance.checked_add(transaction.points)
                .ok_or_else(|| LedgerError::balance_overflow(transaction))?;
        }

        session.insert(&transaction.payer, transaction.points, transaction.timestamp)?;

        if transaction.points >= 0 {
            return Ok(Vec::new());
        }

        let debit = transaction.points.checked_neg()
            .ok_or_else(|| LedgerError::invalid_correction(transaction))?;

        let allocation = SpendAllocator::allocate(&*session, debit).map_err(|error| match error {
            LedgerError::InsufficientPoints { .. } => LedgerError::invalid_correction(transaction),
            other => other
        })?;

        Self::record_spend(session, &allocation, now)?;

        Ok(allocation.details)
    }
}
