// Copyright (c) 2024 The Drisschain Developers

//! Read-only chain queries over committed state.
//!
//! Account-scoped queries only ever read the storage of the address asked
//! about.

use num_bigint::BigUint;

use crate::block::Block;
use crate::ledger::{Ledger, LedgerError, StateReader};
use crate::transaction::Transaction;

/// Block selector for queries that accept either form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId<'a> {
    Number(u64),
    Hash(&'a str),
}

pub struct ChainQuery<'a> {
    ledger: &'a Ledger,
}

impl<'a> ChainQuery<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    /// Number of the latest stored block (0 before genesis).
    pub fn block_number(&self) -> Result<u64, LedgerError> {
        self.ledger.height()
    }

    pub fn block(&self, id: BlockId<'_>) -> Result<Option<Block>, LedgerError> {
        match id {
            BlockId::Number(number) => self.ledger.get_block(number),
            BlockId::Hash(hash) => self.ledger.get_block_by_hash(hash),
        }
    }

    pub fn transaction_count(&self, id: BlockId<'_>) -> Result<Option<usize>, LedgerError> {
        Ok(self.block(id)?.map(|b| b.transactions.len()))
    }

    pub fn transaction(
        &self,
        id: BlockId<'_>,
        index: usize,
    ) -> Result<Option<Transaction>, LedgerError> {
        let Some(mut block) = self.block(id)? else {
            return Ok(None);
        };
        if index >= block.transactions.len() {
            return Ok(None);
        }
        Ok(Some(block.transactions.swap_remove(index)))
    }

    pub fn balance(&self, address: &str) -> Result<Option<BigUint>, LedgerError> {
        Ok(self.ledger.account(address)?.map(|a| a.balance))
    }

    pub fn code_hash(&self, address: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.ledger.account(address)?.map(|a| a.code_hash))
    }

    /// Contract source; empty for an account without code.
    pub fn code(&self, address: &str) -> Result<Option<String>, LedgerError> {
        let Some(account) = self.ledger.account(address)? else {
            return Ok(None);
        };
        if !account.is_contract() {
            return Ok(Some(String::new()));
        }
        self.ledger.code(&account.code_hash)
    }

    pub fn storage(&self, address: &str, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.ledger.storage(address)?.remove(key))
    }

    pub fn storage_keys(&self, address: &str) -> Result<Vec<String>, LedgerError> {
        Ok(self.ledger.storage(address)?.into_keys().collect())
    }

    pub fn storage_root(&self, address: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.ledger.account(address)?.map(|a| a.storage_root))
    }
}
