use std::collections::BTreeMap;

use tracing::debug;

use crate::engine::BalanceCalculator;
use crate::models::{LedgerError, SpendingDetail};
use crate::storage::LedgerSession;
use crate::types::{Payer, Points, TransactionId};

/// What a spend takes from the ledger, computed before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Points taken per payer (negative), in the order the payers were first drawn on.
    pub details: Vec<SpendingDetail>,
    /// New `remaining_points` for every transaction the spend touched.
    pub updated_remaining: BTreeMap<TransactionId, Points>
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}

/// Decides which transactions pay for a spend, oldest first regardless of payer.
pub struct SpendAllocator;

impl SpendAllocator {
    /// Walks the spendable transactions until `amount` is covered.
    ///
    /// # Errors
    /// Returns `LedgerError::InsufficientPoints` when the ledger as a whole holds
    /// less than `amount`. Nothing is staged on the session either way.
    pub fn allocate<L: LedgerSession>(session: &L, amount: Points) -> Result<Allocation, LedgerError> {
        if amount <= 0 {
            return Ok(Allocation::default());
        }

        let snapshot = BalanceCalculator::balance(session)?;
        let spendable = session.query_positive_remaining()?;

        let mut working = snapshot.clone();
        let mut drawn_on: Vec<Payer> = Vec::new();
        let mut updated_remaining = BTreeMap::new();
        let mut remaining_to_spend = amount;

        for entry in &spendable {
            if remaining_to_spend == 0 {
                break;
            }

            let taken = remaining_to_spend.min(entry.remaining_points);

            updated_remaining.insert(entry.id, entry.remaining_points - taken);
            *working.entry(entry.payer.clone()).or_insert(0) -= taken;
            remaining_to_spend -= taken;

            if !drawn_on.contains(&entry.payer) {
                drawn_on.push(entry.payer.clone());
            }
        }

        if remaining_to_spend > 0 {
            return Err(LedgerError::insufficient_points(amount, amount - remaining_to_spend));
        }

        let details = drawn_on.into_iter()
            .filter_map(|payer| {
                let before = snapshot.get(&payer).copied().unwrap_or(0);
                let after = working.get(&payer).copied().unwrap_or(0);

                (after < before).then(|| SpendingDetail::new(payer, after - before))
            })
            .collect();

        debug!("Allocated [{amount}] points over [{}] transactions", updated_remaining.len());

        Ok(Allocation { details, updated_remaining })
    }
}
