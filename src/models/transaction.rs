use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Payer, Points};

/// An earn (or correction) submitted to the ledger.
///
/// Positive `points` credit the payer. Negative `points` are a correction that
/// debits the ledger oldest-first, the same way a spend does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub payer: Payer,
    pub points: Points,
    /// When the points were earned. Establishes spend order.
    pub timestamp: DateTime<Utc>
}
