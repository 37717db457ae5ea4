// Copyright (c) 2024 The Drisschain Developers

//! Pending transaction pool.
//!
//! Transactions are kept in arrival order. A sender's pooled transactions
//! always continue its committed nonce without gaps: admission requires the
//! next nonce after both the committed nonce and the sender's highest pooled
//! one, and [`TxPool::evict_stale`] rebuilds the pool after every committed
//! block.

use num_bigint::BigUint;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ChainParams;
use crate::ledger::{LedgerError, StateReader};
use crate::transaction::{Transaction, TxError};

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("Invalid transaction: {0}")]
    Invalid(#[from] TxError),

    #[error("Contract gas {contract_gas} exceeds the block gas limit {limit}")]
    ContractGasExceedsLimit {
        contract_gas: BigUint,
        limit: BigUint,
    },

    #[error("Transaction {0} is already pooled")]
    Duplicate(String),

    #[error("Invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: u64, actual: u64 },
}

impl From<LedgerError> for MempoolError {
    fn from(e: LedgerError) -> Self {
        MempoolError::Invalid(TxError::Ledger(e))
    }
}

/// A pooled transaction with its recovered sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledTx {
    pub tx: Transaction,
    pub sender: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct TxPool {
    entries: Vec<PooledTx>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `tx` if it is weakly valid and continues its sender's nonce.
    pub fn admit<S: StateReader>(
        &mut self,
        tx: Transaction,
        state: &S,
        params: &ChainParams,
    ) -> Result<(), MempoolError> {
        let sender = tx.validate(state, params)?;

        let contract_gas = tx.contract_gas();
        if contract_gas > params.block_gas_limit {
            return Err(MempoolError::ContractGasExceedsLimit {
                contract_gas,
                limit: params.block_gas_limit.clone(),
            });
        }

        if !state.contains(&sender)? {
            return Err(TxError::UnknownSender(sender).into());
        }

        let hash = tx.hash();
        if self.contains(&hash) {
            return Err(MempoolError::Duplicate(hash));
        }

        let committed = state.account(&sender)?.map(|a| a.nonce).unwrap_or(0);
        let pooled = self
            .entries
            .iter()
            .filter(|entry| entry.sender == sender)
            .map(|entry| entry.tx.nonce)
            .max()
            .unwrap_or(0);
        let expected = committed.max(pooled) + 1;
        if tx.nonce != expected {
            return Err(MempoolError::InvalidNonce {
                expected,
                actual: tx.nonce,
            });
        }

        debug!(hash = %hash, sender = %sender, nonce = tx.nonce, "Admitted transaction");
        self.entries.push(PooledTx { tx, sender, hash });
        Ok(())
    }

    /// Rebuild the pool against newly committed state.
    ///
    /// Transactions the chain already includes are dropped. A sender whose
    /// next transaction leaves a nonce gap or no longer validates loses every
    /// remaining pooled transaction.
    pub fn evict_stale<S: StateReader>(
        &mut self,
        state: &S,
        params: &ChainParams,
    ) -> Result<(), LedgerError> {
        let before = self.entries.len();
        let mut expected: HashMap<String, u64> = HashMap::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(before);

        for entry in std::mem::take(&mut self.entries) {
            if skipped.contains(&entry.sender) {
                continue;
            }

            let next = match expected.get(&entry.sender) {
                Some(nonce) => *nonce,
                None => state.account(&entry.sender)?.map(|a| a.nonce).unwrap_or(0),
            };

            if entry.tx.nonce <= next {
                continue;
            }

            let valid = match entry.tx.validate(state, params) {
                Ok(_) => true,
                Err(TxError::Ledger(e)) => return Err(e),
                Err(_) => false,
            };
            if entry.tx.nonce != next + 1 || !valid {
                skipped.insert(entry.sender);
                continue;
            }

            expected.insert(entry.sender.clone(), entry.tx.nonce);
            kept.push(entry);
        }

        self.entries = kept;
        if self.entries.len() != before {
            info!(
                before,
                after = self.entries.len(),
                skipped_senders = skipped.len(),
                "Evicted stale transactions"
            );
        }
        Ok(())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.iter().any(|entry| entry.hash == hash)
    }

    /// Pooled transactions in arrival order.
    pub fn entries(&self) -> &[PooledTx] {
        &self.entries
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter().map(|entry| &entry.tx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_public_key;
    use crate::ledger::{AccountRecord, Ledger};
    use crate::transaction::AdditionalData;
    use dss_crypto_secp256k1::Secp256k1Keypair;
    use rand::rngs::OsRng;
    use tempfile::{tempdir, TempDir};

    const GAS: u64 = 2_000_000_000;

    fn setup(balance: u64, nonce: u64) -> (TempDir, Ledger, Secp256k1Keypair, String) {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        let keypair = Secp256k1Keypair::generate(&mut OsRng);
        let address = address_from_public_key(&keypair.public_key_hex());
        let record = AccountRecord {
            nonce,
            ..AccountRecord::with_balance(BigUint::from(balance))
        };
        ledger.put_account(&address, &record).unwrap();
        (dir, ledger, keypair, address)
    }

    fn tx(keypair: &Secp256k1Keypair, nonce: u64, data: AdditionalData) -> Transaction {
        let mut tx = Transaction::new(
            "b".repeat(64),
            BigUint::from(1u32),
            BigUint::from(GAS),
            data,
            nonce,
        );
        tx.sign(keypair).unwrap();
        tx
    }

    #[test]
    fn test_admit_sequential_nonces() {
        let (_dir, ledger, keypair, _) = setup(100 * GAS, 0);
        let params = ChainParams::default();
        let mut pool = TxPool::new();

        pool.admit(tx(&keypair, 1, AdditionalData::default()), &ledger, &params)
            .unwrap();
        pool.admit(tx(&keypair, 2, AdditionalData::default()), &ledger, &params)
            .unwrap();
        assert_eq!(pool.len(), 2);

        let err = pool
            .admit(tx(&keypair, 4, AdditionalData::default()), &ledger, &params)
            .unwrap_err();
        assert!(matches!(
            err,
            MempoolError::InvalidNonce {
                expected: 3,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_same_nonce_twice_is_rejected() {
        let (_dir, ledger, keypair, _) = setup(100 * GAS, 0);
        let params = ChainParams::default();
        let mut pool = TxPool::new();

        pool.admit(tx(&keypair, 1, AdditionalData::default()), &ledger, &params)
            .unwrap();

        let mut other = tx(&keypair, 1, AdditionalData::default());
        other.amount = BigUint::from(2u32);
        other.sign(&keypair).unwrap();
        assert!(matches!(
            pool.admit(other, &ledger, &params),
            Err(MempoolError::InvalidNonce { .. })
        ));

        assert!(matches!(
            pool.admit(tx(&keypair, 1, AdditionalData::default()), &ledger, &params),
            Err(MempoolError::Duplicate(_))
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_admission_continues_committed_nonce() {
        let (_dir, ledger, keypair, _) = setup(100 * GAS, 5);
        let params = ChainParams::default();
        let mut pool = TxPool::new();

        assert!(matches!(
            pool.admit(tx(&keypair, 1, AdditionalData::default()), &ledger, &params),
            Err(MempoolError::InvalidNonce {
                expected: 6,
                actual: 1
            })
        ));
        pool.admit(tx(&keypair, 6, AdditionalData::default()), &ledger, &params)
            .unwrap();
        pool.admit(tx(&keypair, 7, AdditionalData::default()), &ledger, &params)
            .unwrap();
    }

    #[test]
    fn test_contract_gas_over_limit() {
        let (_dir, ledger, keypair, _) = setup(100 * GAS, 0);
        let params = ChainParams {
            block_gas_limit: BigUint::from(10u32),
            ..ChainParams::default()
        };
        let mut pool = TxPool::new();
        let data = AdditionalData {
            contract_gas: Some(BigUint::from(11u32)),
            ..AdditionalData::default()
        };
        assert!(matches!(
            pool.admit(tx(&keypair, 1, data), &ledger, &params),
            Err(MempoolError::ContractGasExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_evict_drops_committed_and_keeps_continuation() {
        let (_dir, ledger, keypair, address) = setup(100 * GAS, 0);
        let params = ChainParams::default();
        let mut pool = TxPool::new();
        for nonce in 1..=3 {
            pool.admit(tx(&keypair, nonce, AdditionalData::default()), &ledger, &params)
                .unwrap();
        }

        // A block commits nonces 1 and 2.
        let record = AccountRecord {
            nonce: 2,
            ..AccountRecord::with_balance(BigUint::from(90 * GAS))
        };
        ledger.put_account(&address, &record).unwrap();

        pool.evict_stale(&ledger, &params).unwrap();
        let nonces: Vec<u64> = pool.transactions().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![3]);
        assert!(pool.transactions().all(|t| t.nonce > record.nonce));
    }

    #[test]
    fn test_evict_skips_sender_after_invalid_tx() {
        let (_dir, ledger, keypair, address) = setup(100 * GAS, 0);
        let params = ChainParams::default();
        let mut pool = TxPool::new();
        for nonce in 1..=3 {
            pool.admit(tx(&keypair, nonce, AdditionalData::default()), &ledger, &params)
                .unwrap();
        }

        // The sender can no longer afford anything.
        ledger
            .put_account(&address, &AccountRecord::with_balance(BigUint::from(1u32)))
            .unwrap();

        pool.evict_stale(&ledger, &params).unwrap();
        assert!(pool.is_empty());
    }
}
