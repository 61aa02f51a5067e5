use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayerError {
    #[error("Payer error: name is empty")]
    Empty,
    #[error("Payer error: name is {0} bytes, the limit is {limit}", limit = super::payer::MAX_PAYER_LENGTH)]
    TooLong(usize)
}
