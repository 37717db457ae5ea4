// Copyright (c) 2024 The Drisschain Developers

mod store;

pub use store::Ledger;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::crypto::EMPTY_HASH;
use crate::numeric;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] lmdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Block not found: number {0}")]
    BlockNotFound(u64),
}

/// Contract key/value storage, ordered by key.
pub type StorageMap = BTreeMap<String, String>;

/// Accounts touched by a replay, keyed by address.
pub type AccountStates = BTreeMap<String, AccountRecord>;

/// Persisted state of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(with = "numeric::decimal")]
    pub balance: BigUint,
    pub code_hash: String,
    pub nonce: u64,
    pub storage_root: String,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self {
            balance: BigUint::default(),
            code_hash: EMPTY_HASH.to_string(),
            nonce: 0,
            storage_root: EMPTY_HASH.to_string(),
        }
    }
}

impl AccountRecord {
    /// A fresh externally-owned account holding `balance`.
    pub fn with_balance(balance: BigUint) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Whether code is deployed at this account.
    pub fn is_contract(&self) -> bool {
        self.code_hash != EMPTY_HASH
    }
}

/// Read access to committed chain state.
///
/// Implemented by [`Ledger`]; blocks are written through [`Ledger::commit_block`].
pub trait StateReader {
    fn account(&self, address: &str) -> Result<Option<AccountRecord>, LedgerError>;

    fn contains(&self, address: &str) -> Result<bool, LedgerError> {
        Ok(self.account(address)?.is_some())
    }

    fn code(&self, code_hash: &str) -> Result<Option<String>, LedgerError>;

    /// All persisted storage entries of a contract.
    fn storage(&self, address: &str) -> Result<StorageMap, LedgerError>;
}

/// Writes produced by one block replay, committed with the block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChanges {
    pub accounts: AccountStates,
    /// code hash -> contract source
    pub code: BTreeMap<String, String>,
    /// address -> storage entries to persist
    pub storage: BTreeMap<String, StorageMap>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.code.is_empty() && self.storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_record_json_shape() {
        let record = AccountRecord::with_balance(BigUint::from(1000u32));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["balance"], "1000");
        assert_eq!(json["codeHash"], EMPTY_HASH);
        assert_eq!(json["nonce"], 0);
        assert_eq!(json["storageRoot"], EMPTY_HASH);
        assert!(!record.is_contract());
    }

    #[test]
    fn test_account_record_rejects_bad_balance() {
        let json = format!(
            r#"{{"balance":"12a","codeHash":"{EMPTY_HASH}","nonce":0,"storageRoot":"{EMPTY_HASH}"}}"#
        );
        assert!(serde_json::from_str::<AccountRecord>(&json).is_err());
    }
}
