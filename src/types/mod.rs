mod errors;
mod payer;

pub use errors::PayerError;
pub use payer::Payer;

pub type Points = i64;
pub type TransactionId = u64;
