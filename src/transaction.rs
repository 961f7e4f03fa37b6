use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// `0x` followed by 40 hex digits. Case is preserved as received; the store
/// compares addresses with plain varchar equality, so no normalization
/// happens here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("address must match 0x followed by 40 hex digits")]
pub struct AddressError;

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").ok_or(AddressError)?;
        if digits.len() != 40 || hex::decode(digits).is_err() {
            return Err(AddressError);
        }
        Ok(Self(s.to_string()))
    }
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The canonical record both adapters produce and the write engine consumes.
/// `timestamp` is the chain epoch in seconds; `to_address` is non-optional
/// because contract creations are dropped before a record exists.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub timestamp: i64,
    pub status: bool,
    pub block_number: i64,
    pub tx_index: i32,
    pub from_address: Address,
    pub to_address: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub gas_price: U256,
}

/// Row shape of the read path. The 256-bit columns come back as decimal
/// strings (selected with `::text`) and are served as-is.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredTransaction {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: bool,
    pub block_number: i64,
    pub tx_index: i32,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub gas_price: String,
}
