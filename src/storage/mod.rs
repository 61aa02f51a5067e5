mod journal;
mod memory_ledger;

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::models::{Balances, LedgerError, SpendableEntry};
use crate::types::{Payer, Points, TransactionId};

pub use journal::Journal;
pub use memory_ledger::{MemoryLedger, MemorySession};

/// A ledger that hands out one exclusive session at a time.
pub trait LedgerStore: Send + Sync + 'static {
    type Session: LedgerSession + Send;

    /// Waits for exclusive access and opens a session over the current state.
    fn begin(&self) -> impl Future<Output = Result<Self::Session, LedgerError>> + Send;
}

/// A scoped unit of work against the ledger.
///
/// Reads observe the session's own staged writes. Nothing staged is visible to
/// other sessions until `commit`; dropping the session discards it.
pub trait LedgerSession {
    /// Stages a new row and returns its id. Rows with non-positive points are never spendable.
    fn insert(&mut self, payer: &Payer, points: Points, timestamp: DateTime<Utc>) -> Result<TransactionId, LedgerError>;

    /// Rows that still have points to spend, oldest first.
    fn query_positive_remaining(&self) -> Result<Vec<SpendableEntry>, LedgerError>;

    /// Sets `remaining_points` for each id. Rejects the whole batch if any id is
    /// unknown or any value falls outside `0..=max(points, 0)`.
    fn update_remaining(&mut self, updates: &BTreeMap<TransactionId, Points>) -> Result<(), LedgerError>;

    /// Remaining points per payer, over every payer that has earned points.
    fn aggregate_balances(&self) -> Result<Balances, LedgerError>;

    fn commit(self) -> Result<(), LedgerError>;
}
