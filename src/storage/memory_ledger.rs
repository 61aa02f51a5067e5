use std::collections::BTreeMap;
use std::future::Future;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::block_in_place;
use tracing::{debug, info};

use crate::models::{Balances, LedgerEntry, LedgerError, SpendableEntry};
use crate::storage::{Journal, LedgerSession, LedgerStore};
use crate::types::{Payer, Points, TransactionId};

struct LedgerState {
    /// Row `id` lives at index `id - 1`.
    entries: Vec<LedgerEntry>,
    journal: Option<Journal>
}

/// Ledger held in memory behind a single lock, optionally backed by a journal.
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>
}

impl MemoryLedger {
    /// Creates an empty ledger that is lost when dropped.
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), None)
    }

    /// Opens (or creates) the journal at `path` and rebuilds the ledger from it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let (journal, entries) = Journal::open(path)?;

        info!("Ledger restored with [{}] entries", entries.len());

        Ok(Self::from_parts(entries, Some(journal)))
    }

    fn from_parts(entries: Vec<LedgerEntry>, journal: Option<Journal>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState { entries, journal }))
        }
    }

    /// Copy of every committed row, in id order.
    #[cfg(test)]
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryLedger {
    type Session = MemorySession;

    fn begin(&self) -> impl Future<Output = Result<Self::Session, LedgerError>> + Send {
        let state = self.state.clone();

        async move {
            Ok(MemorySession {
                state: state.lock_owned().await,
                inserted: Vec::new(),
                updates: BTreeMap::new()
            })
        }
    }
}

/// Exclusive session over a [`MemoryLedger`]. Writes are staged until `commit`.
pub struct MemorySession {
    state: OwnedMutexGuard<LedgerState>,
    inserted: Vec<LedgerEntry>,
    updates: BTreeMap<TransactionId, Points>
}

fn index_of(id: TransactionId) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

/// Runs a blocking journal write, moving other tasks off this worker when the runtime allows it.
fn blocking<T>(write: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => block_in_place(write),
        _ => write()
    }
}

impl MemorySession {
    fn entry(&self, id: TransactionId) -> Option<&LedgerEntry> {
        let index = index_of(id)?;
        let committed = self.state.entries.len();

        if index < committed {
            self.state.entries.get(index)
        } else {
            self.inserted.get(index - committed)
        }
    }

    fn remaining(&self, entry: &LedgerEntry) -> Points {
        self.updates.get(&entry.id).copied().unwrap_or(entry.remaining_points)
    }

    fn rows(&self) -> impl Iterator<Item = (&LedgerEntry, Points)> {
        self.state.entries.iter()
            .chain(self.inserted.iter())
            .map(move |entry| (entry, self.remaining(entry)))
    }

    fn has_staged_writes(&self) -> bool {
        !self.inserted.is_empty() || !self.updates.is_empty()
    }

    /// Stages an update without the bounds checks of `update_remaining`.
    #[cfg(test)]
    pub(crate) fn stage_unchecked_update(&mut self, id: TransactionId, remaining_points: Points) {
        self.updates.insert(id, remaining_points);
    }
}

impl LedgerSession for MemorySession {
    fn insert(&mut self, payer: &Payer, points: Points, timestamp: DateTime<Utc>) -> Result<TransactionId, LedgerError> {
        let id = TransactionId::try_from(self.state.entries.len() + self.inserted.len() + 1)
            .map_err(|error| LedgerError::storage("insert", error.to_string()))?;

        self.inserted.push(LedgerEntry::new(id, payer.clone(), points, timestamp));

        Ok(id)
    }

    fn query_positive_remaining(&self) -> Result<Vec<SpendableEntry>, LedgerError> {
        let mut spendable: Vec<SpendableEntry> = self.rows()
            .filter(|(_, remaining)| *remaining > 0)
            .map(|(entry, remaining)| SpendableEntry {
                remaining_points: remaining,
                ..SpendableEntry::from(entry)
            })
            .collect();

        spendable.sort_by(|left, right| left.timestamp.cmp(&right.timestamp).then(left.id.cmp(&right.id)));

        Ok(spendable)
    }

    fn update_remaining(&mut self, updates: &BTreeMap<TransactionId, Points>) -> Result<(), LedgerError> {
        for (&id, &remaining) in updates {
            let entry = self.entry(id)
                .ok_or_else(|| LedgerError::storage("update_remaining", format!("transaction [{id}] does not exist")))?;

            if remaining < 0 || remaining > entry.spendable_limit() {
                return Err(LedgerError::storage(
                    "update_remaining",
                    format!("remaining points [{remaining}] out of range for transaction [{id}] worth [{}]", entry.points)
                ));
            }
        }

        self.updates.extend(updates);

        Ok(())
    }

    fn aggregate_balances(&self) -> Result<Balances, LedgerError> {
        let mut balances = Balances::new();

        for (entry, remaining) in self.rows().filter(|(entry, _)| entry.is_earn()) {
            let balance = balances.entry(entry.payer.clone()).or_insert(0);

            *balance = balance.checked_add(remaining)
                .ok_or_else(|| LedgerError::storage("aggregate_balances", format!("balance overflow for payer [{}]", entry.payer)))?;
        }

        Ok(balances)
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        if !self.has_staged_writes() {
            return Ok(());
        }

        let total = self.state.entries.len() + self.inserted.len();

        if let Some(id) = self.updates.keys().copied().find(|&id| index_of(id).is_none_or(|index| index >= total)) {
            return Err(LedgerError::storage("commit", format!("update of unknown transaction [{id}]")));
        }

        let inserted = mem::take(&mut self.inserted);
        let updates = mem::take(&mut self.updates);

        if let Some(journal) = self.state.journal.as_mut() {
            blocking(|| journal.append(&inserted, &updates))?;
        }

        self.state.entries.extend(inserted);

        for (id, remaining) in updates {
            //NOTE: Every id was resolved against `total` above
            if let Some(entry) = index_of(id).and_then(|index| self.state.entries.get_mut(index)) {
                entry.remaining_points = remaining;
            }
        }

        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.has_staged_writes() {
            debug!("Session rolled back [{}] inserts and [{}] updates", self.inserted.len(), self.updates.len());
        }
    }
}
