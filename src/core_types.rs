//! Core types used throughout the system
//!
//! Identifiers are newtypes so that a pool id can never be passed where a
//! transaction id is expected, and so that addresses and hashes are only
//! constructed through their validating parsers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an EVM address string including the `0x` prefix.
pub const ADDRESS_LEN: usize = 42;

/// Length of an EVM transaction hash string including the `0x` prefix.
pub const TX_HASH_LEN: usize = 66;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    #[error("Malformed transaction hash: {0}")]
    MalformedTxHash(String),

    #[error("Malformed id: {0}")]
    MalformedId(String),
}

/// Pool ID - ULID-based, sortable by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(ulid::Ulid);

impl PoolId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PoolId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s)
            .map(Self)
            .map_err(|_| IdentifierError::MalformedId(s.to_string()))
    }
}

/// Transaction ID - row identity of a ledger entry (the idempotency key is the
/// [`TxHash`], not this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s)
            .map(Self)
            .map_err(|_| IdentifierError::MalformedId(s.to_string()))
    }
}

/// Checks `0x` prefix, total length and hex body; returns the lowercase form.
fn normalize_hex(s: &str, expected_len: usize) -> Option<String> {
    let s = s.trim();
    if s.len() != expected_len {
        return None;
    }
    let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    hex::decode(body).ok()?;
    Some(format!("0x{}", body.to_ascii_lowercase()))
}

/// EVM address (token contract or wallet), stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        normalize_hex(s, ADDRESS_LEN)
            .map(Self)
            .ok_or_else(|| IdentifierError::MalformedAddress(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// On-chain transaction hash - the external idempotency key of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        normalize_hex(s, TX_HASH_LEN)
            .map(Self)
            .ok_or_else(|| IdentifierError::MalformedTxHash(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TxHash {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TxHash {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TxHash> for String {
    fn from(value: TxHash) -> Self {
        value.0
    }
}
