// Copyright (c) 2024 The Drisschain Developers

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crypto::{is_digest_hex, sha256_hex};
use crate::ledger::{LedgerError, StateReader};
use crate::merkle::merkle_root;
use crate::transaction::Transaction;

/// Difficulty of the genesis block and of a fresh chain.
pub use dss_consensus_pow::GENESIS_DIFFICULTY;

/// Longest coinbase a block may name; one address.
pub const MAX_COINBASE_LEN: usize = 64;

/// A block: ordered transactions plus the header fields covered by `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_number: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub difficulty: u64,
    /// Empty for the genesis block
    pub parent_hash: String,
    /// Proof-of-work counter
    pub nonce: u64,
    pub tx_root: String,
    /// Address receiving the block reward and fees
    pub coinbase: String,
    pub hash: String,
}

impl Block {
    /// Build an unsealed block (nonce 0) with its txRoot and hash computed.
    pub fn new(
        block_number: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        difficulty: u64,
        parent_hash: impl Into<String>,
        coinbase: impl Into<String>,
    ) -> Self {
        let tx_root = compute_tx_root(&transactions);
        let mut block = Self {
            block_number,
            timestamp,
            transactions,
            difficulty,
            parent_hash: parent_hash.into(),
            nonce: 0,
            tx_root,
            coinbase: coinbase.into(),
            hash: String::new(),
        };
        block.hash = block.get_hash();
        block
    }

    /// Block 1: no transactions, difficulty 1, empty parent hash.
    pub fn genesis(first_account: &str, timestamp: u64) -> Self {
        Self::new(1, timestamp, Vec::new(), GENESIS_DIFFICULTY, "", first_account)
    }

    /// Header hash for an arbitrary nonce.
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        sha256_hex(format!(
            "{}{}{}{}{}{}",
            self.block_number, self.timestamp, self.tx_root, self.difficulty, self.parent_hash, nonce
        ))
    }

    /// Recompute the hash from the header fields, ignoring the stored `hash`.
    pub fn get_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    /// Fix the proof-of-work nonce and the matching hash.
    pub fn seal(&mut self, nonce: u64, hash: String) {
        self.nonce = nonce;
        self.hash = hash;
    }

    /// Structural check of the header fields.
    pub fn has_valid_prop_types(&self) -> bool {
        is_digest_hex(&self.hash)
            && is_digest_hex(&self.tx_root)
            && (self.parent_hash.is_empty() || is_digest_hex(&self.parent_hash))
            && !self.coinbase.is_empty()
            && self.coinbase.len() <= MAX_COINBASE_LEN
    }

    /// Each sender's transactions must continue its committed nonce without gaps.
    ///
    /// An unrecoverable signature or an unknown sender makes the order invalid.
    pub fn has_valid_tx_order<S: StateReader>(&self, state: &S) -> Result<bool, LedgerError> {
        let mut nonces: HashMap<String, u64> = HashMap::new();

        for tx in &self.transactions {
            let Ok(sender) = tx.sender() else {
                return Ok(false);
            };

            let expected = match nonces.get(&sender) {
                Some(nonce) => *nonce,
                None => match state.account(&sender)? {
                    Some(account) => account.nonce,
                    None => return Ok(false),
                },
            };

            if tx.nonce != expected + 1 {
                return Ok(false);
            }
            nonces.insert(sender, tx.nonce);
        }

        Ok(true)
    }

    /// Sum of `contractGas` over the block.
    pub fn total_contract_gas(&self) -> BigUint {
        self.transactions.iter().map(Transaction::contract_gas).sum()
    }

    /// `Σ contractGas ≤ limit`. Plain `gas` is not capped.
    pub fn has_valid_gas_limit(&self, limit: &BigUint) -> bool {
        &self.total_contract_gas() <= limit
    }

    /// Sum of `gas + contractGas` over the block.
    pub fn total_fees(&self) -> BigUint {
        self.transactions.iter().map(Transaction::fee).sum()
    }
}

/// Merkle root over `index ‖ json(tx)` for each transaction.
pub fn compute_tx_root(transactions: &[Transaction]) -> String {
    let items: Vec<String> = transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| format!("{index}{}", tx.canonical_json()))
        .collect();
    merkle_root(&items)
}
