use serde::{Deserialize, Serialize};

use crate::types::{Payer, Points};

/// Body of a spend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRequest {
    pub points: Points
}

/// Points taken from one payer by a spend. `points` is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingDetail {
    pub payer: Payer,
    pub points: Points
}

impl SpendingDetail {
    pub fn new(payer: Payer, points: Points) -> Self {
        Self { payer, points }
    }
}
