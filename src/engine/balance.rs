use crate::models::{Balances, LedgerError};
use crate::storage::LedgerSession;

/// Read-side view of what each payer can still spend.
pub struct BalanceCalculator;

impl BalanceCalculator {
    /// Snapshot of remaining points per payer. Payers whose earns are fully spent report 0.
    pub fn balance<L: LedgerSession>(session: &L) -> Result<Balances, LedgerError> {
        let balances = session.aggregate_balances()?;

        if let Some((payer, points)) = balances.iter().find(|(_, points)| **points < 0) {
            return Err(LedgerError::storage("balance", format!("payer [{payer}] has a negative balance of [{points}]")));
        }

        Ok(balances)
    }
}
