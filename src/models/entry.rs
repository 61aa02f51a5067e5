use chrono::{DateTime, Utc};

use crate::types::{Payer, Points, TransactionId};

/// A stored ledger row.
///
/// Everything but `remaining_points` is fixed at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: TransactionId,
    pub payer: Payer,
    /// Face value credited (positive) or debited (negative).
    pub points: Points,
    /// Portion of `points` not yet consumed by a spend. Always within `0..=max(points, 0)`.
    pub remaining_points: Points,
    pub timestamp: DateTime<Utc>
}

impl LedgerEntry {
    pub fn new(id: TransactionId, payer: Payer, points: Points, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            payer,
            points,
            remaining_points: points.max(0),
            timestamp
        }
    }

    /// Upper bound for `remaining_points`.
    pub fn spendable_limit(&self) -> Points {
        self.points.max(0)
    }

    pub fn is_earn(&self) -> bool {
        self.points > 0
    }
}

/// The slice of a ledger row the spend allocator walks over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableEntry {
    pub id: TransactionId,
    pub payer: Payer,
    pub remaining_points: Points,
    pub timestamp: DateTime<Utc>
}

impl From<&LedgerEntry> for SpendableEntry {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id,
            payer: entry.payer.clone(),
            remaining_points: entry.remaining_points,
            timestamp: entry.timestamp
        }
    }
}
