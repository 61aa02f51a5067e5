mod entry;
mod errors;
mod spending;
mod transaction;

use std::collections::BTreeMap;

use crate::types::{Payer, Points};

pub use entry::{LedgerEntry, SpendableEntry};
pub use errors::{ErrorClass, LedgerError};
pub use spending::{SpendRequest, SpendingDetail};
pub use transaction::Transaction;

/// Spendable points per payer, ordered by payer name.
pub type Balances = BTreeMap<Payer, Points>;
