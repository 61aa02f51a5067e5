use crate::models::Transaction;
use crate::types::{Payer, Points};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Storage failure during [{operation}]: {message}")]
    StorageFailure {
        operation: &'static str,
        message: String
    },
    #[error("Insufficient points: requested [{requested}] but only [{available}] available")]
    InsufficientPoints {
        requested: Points,
        available: Points
    },
    #[error("Correction of [{points}] points for payer [{payer}] would make the balance negative")]
    InvalidCorrection {
        payer: Payer,
        points: Points
    },
    #[error("Adding [{points}] points for payer [{payer}] would overflow its balance")]
    BalanceOverflow {
        payer: Payer,
        points: Points
    }
}

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself cannot be satisfied; retrying it unchanged will fail again.
    BadRequest,
    Internal
}

impl LedgerError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::StorageFailure {
            operation,
            message: message.into()
        }
    }

    pub fn insufficient_points(requested: Points, available: Points) -> Self {
        Self::InsufficientPoints { requested, available }
    }

    pub fn invalid_correction(tx: &Transaction) -> Self {
        Self::InvalidCorrection {
            payer: tx.payer.clone(),
            points: tx.points
        }
    }

    pub fn balance_overflow(tx: &Transaction) -> Self {
        Self::BalanceOverflow {
            payer: tx.payer.clone(),
            points: tx.points
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StorageFailure { .. } => ErrorClass::Internal,
            Self::InsufficientPoints { .. }
            | Self::InvalidCorrection { .. }
            | Self::BalanceOverflow { .. } => ErrorClass::BadRequest
        }
    }
}
