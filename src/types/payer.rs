use crate::types::PayerError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub(crate) const MAX_PAYER_LENGTH: usize = 255;

/// Name of a point-issuing partner.
///
/// Always trimmed and never empty, so two spellings that differ only by
/// surrounding whitespace land on the same balance.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Payer(String);

impl Payer {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Payer {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Payer {
    type Err = PayerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if value.is_empty() {
            return Err(PayerError::Empty);
        }

        if value.len() > MAX_PAYER_LENGTH {
            return Err(PayerError::TooLong(value.len()));
        }

        Ok(Payer(value.to_string()))
    }
}

impl Serialize for Payer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Payer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Payer::from_str(&value).map_err(de::Error::custom)
    }
}
