// Copyright (c) 2024 The Drisschain Developers

//! Block validation.
//!
//! Checks run cheapest first. The final check replays the block; nothing is
//! written, the caller commits the returned changes with the block.

use dss_consensus_pow::{check_pow, PowError};
use num_bigint::BigUint;
use thiserror::Error;
use tracing::{debug, warn};

use super::now_millis;
use crate::block::{compute_tx_root, Block};
use crate::config::ChainParams;
use crate::ledger::{Ledger, LedgerError, StateChanges};
use crate::node::ChainInfo;
use crate::transition::{verify_tx_and_transit, TransitionError};

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Malformed block header")]
    InvalidStructure,

    #[error("Hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: String, computed: String },

    #[error("No chain tip to build on")]
    EmptyChain,

    #[error("Wrong parent hash: expected {expected}, got {got}")]
    WrongParent { expected: String, got: String },

    #[error("Insufficient proof of work: {0}")]
    InsufficientWork(#[from] PowError),

    #[error("Wrong difficulty: expected {expected}, got {got}")]
    WrongDifficulty { expected: u64, got: u64 },

    #[error("Transaction nonces are out of order")]
    InvalidTxOrder,

    #[error("Timestamp {timestamp} is not after parent timestamp {parent}")]
    TimestampBeforeParent { timestamp: u64, parent: u64 },

    #[error("Timestamp {timestamp} is not before current time {now}")]
    TimestampInFuture { timestamp: u64, now: u64 },

    #[error("Wrong block number: expected {expected}, got {got}")]
    WrongBlockNumber { expected: u64, got: u64 },

    #[error("Transaction root mismatch")]
    TxRootMismatch,

    #[error("Contract gas {total} exceeds the block gas limit {limit}")]
    GasLimitExceeded { total: BigUint, limit: BigUint },

    #[error("State transition failed: {0}")]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ConsensusError {
    /// Whether the failure came from the store rather than from the block.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            ConsensusError::Ledger(_) | ConsensusError::Transition(TransitionError::Ledger(_))
        )
    }
}

/// Check `block` against the chain tip and replay it.
///
/// Returns the state changes to commit with the block, or the first failing
/// check.
pub fn verify_block(
    block: &Block,
    chain: &ChainInfo,
    ledger: &Ledger,
    params: &ChainParams,
    logging: bool,
) -> Result<StateChanges, ConsensusError> {
    if let Err(e) = check_header(block, chain, ledger, params) {
        warn!(number = block.block_number, hash = %block.hash, error = %e, "Rejected block");
        return Err(e);
    }

    let changes = verify_tx_and_transit(block, ledger, params, logging)?;
    debug!(number = block.block_number, "Block verified");
    Ok(changes)
}

fn check_header(
    block: &Block,
    chain: &ChainInfo,
    ledger: &Ledger,
    params: &ChainParams,
) -> Result<(), ConsensusError> {
    if !block.has_valid_prop_types() {
        return Err(ConsensusError::InvalidStructure);
    }

    let computed = block.get_hash();
    if computed != block.hash {
        return Err(ConsensusError::HashMismatch {
            declared: block.hash.clone(),
            computed,
        });
    }

    let parent = chain.latest_block.as_ref().ok_or(ConsensusError::EmptyChain)?;
    if block.parent_hash != parent.hash {
        return Err(ConsensusError::WrongParent {
            expected: parent.hash.clone(),
            got: block.parent_hash.clone(),
        });
    }

    check_pow(&block.hash, block.difficulty, params.pow_floor_nibbles)?;

    if block.difficulty != chain.difficulty {
        return Err(ConsensusError::WrongDifficulty {
            expected: chain.difficulty,
            got: block.difficulty,
        });
    }

    if !block.has_valid_tx_order(ledger)? {
        return Err(ConsensusError::InvalidTxOrder);
    }

    if block.timestamp <= parent.timestamp {
        return Err(ConsensusError::TimestampBeforeParent {
            timestamp: block.timestamp,
            parent: parent.timestamp,
        });
    }
    let now = now_millis();
    if block.timestamp >= now {
        return Err(ConsensusError::TimestampInFuture {
            timestamp: block.timestamp,
            now,
        });
    }

    let expected = parent.block_number + 1;
    if block.block_number != expected {
        return Err(ConsensusError::WrongBlockNumber {
            expected,
            got: block.block_number,
        });
    }

    if compute_tx_root(&block.transactions) != block.tx_root {
        return Err(ConsensusError::TxRootMismatch);
    }

    if !block.has_valid_gas_limit(&params.block_gas_limit) {
        return Err(ConsensusError::GasLimitExceeded {
            total: block.total_contract_gas(),
            limit: params.block_gas_limit.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_public_key;
    use crate::ledger::{AccountRecord, StateReader};
    use crate::transaction::{AdditionalData, Transaction};
    use dss_consensus_pow::{search_nonce, SearchOutcome};
    use dss_crypto_secp256k1::Secp256k1Keypair;
    use rand::rngs::OsRng;
    use std::sync::atomic::AtomicBool;
    use tempfile::{tempdir, TempDir};

    fn params() -> ChainParams {
        ChainParams {
            pow_floor_nibbles: 1,
            ..ChainParams::default()
        }
    }

    fn setup() -> (TempDir, Ledger, ChainInfo) {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        let genesis = Block::genesis("abc", 1_000);
        ledger
            .commit_block(&genesis, &StateChanges::default(), 1)
            .unwrap();
        let chain = ChainInfo::new(Some(genesis), 1);
        (dir, ledger, chain)
    }

    fn mine(mut block: Block, floor: usize) -> Block {
        let cancel = AtomicBool::new(false);
        match search_nonce(0, block.difficulty, floor, &cancel, |n| block.hash_with_nonce(n)) {
            SearchOutcome::Found { nonce, hash } => block.seal(nonce, hash),
            SearchOutcome::Cancelled => panic!("search cancelled"),
        }
        block
    }

    fn child(chain: &ChainInfo) -> Block {
        let parent = chain.latest_block.as_ref().unwrap();
        Block::new(2, 2_000, Vec::new(), 1, parent.hash.clone(), "miner")
    }

    fn funded(ledger: &Ledger) -> (Secp256k1Keypair, String) {
        let keypair = Secp256k1Keypair::generate(&mut OsRng);
        let address = address_from_public_key(&keypair.public_key_hex());
        ledger
            .put_account(&address, &AccountRecord::with_balance(BigUint::from(10u64.pow(18))))
            .unwrap();
        (keypair, address)
    }

    fn tx(keypair: &Secp256k1Keypair, nonce: u64, contract_gas: u64) -> Transaction {
        let mut tx = Transaction::new(
            "d".repeat(64),
            BigUint::from(1u32),
            BigUint::from(2_000_000_000u64),
            AdditionalData {
                contract_gas: Some(BigUint::from(contract_gas)),
                ..AdditionalData::default()
            },
            nonce,
        );
        tx.sign(keypair).unwrap();
        tx
    }

    fn child_with(chain: &ChainInfo, txs: Vec<Transaction>) -> Block {
        let parent = chain.latest_block.as_ref().unwrap();
        Block::new(2, 2_000, txs, 1, parent.hash.clone(), "miner")
    }

    #[test]
    fn test_valid_empty_block_returns_reward() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let block = mine(child(&chain), params.pow_floor_nibbles);

        let changes = verify_block(&block, &chain, &ledger, &params, false).unwrap();
        assert_eq!(changes.accounts["miner"].balance, params.block_reward);
        // Verification alone writes nothing.
        assert!(ledger.account("miner").unwrap().is_none());
        assert_eq!(ledger.height().unwrap(), 1);
    }

    #[test]
    fn test_bad_tx_order_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let (keypair, sender) = funded(&ledger);
        let before = ledger.account(&sender).unwrap();

        for nonces in [vec![2], vec![1, 1], vec![1, 3], vec![2, 1]] {
            let txs = nonces.iter().map(|n| tx(&keypair, *n, 0)).collect();
            let block = mine(child_with(&chain, txs), params.pow_floor_nibbles);
            assert!(
                matches!(
                    verify_block(&block, &chain, &ledger, &params, false),
                    Err(ConsensusError::InvalidTxOrder)
                ),
                "nonces {nonces:?}"
            );
        }

        assert_eq!(ledger.account(&sender).unwrap(), before);
        assert!(ledger.account(&"d".repeat(64)).unwrap().is_none());
        assert_eq!(ledger.height().unwrap(), 1);
    }

    #[test]
    fn test_gas_limit_exceeded_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = ChainParams {
            block_gas_limit: BigUint::from(1_000u32),
            ..params()
        };
        let (keypair, sender) = funded(&ledger);
        let before = ledger.account(&sender).unwrap();

        // Each fits on its own; together they exceed the limit.
        let txs = vec![tx(&keypair, 1, 600), tx(&keypair, 2, 600)];
        let block = mine(child_with(&chain, txs), params.pow_floor_nibbles);
        assert!(matches!(
            verify_block(&block, &chain, &ledger, &params, false),
            Err(ConsensusError::GasLimitExceeded { .. })
        ));

        let txs = vec![tx(&keypair, 1, 600), tx(&keypair, 2, 400)];
        let block = mine(child_with(&chain, txs), params.pow_floor_nibbles);
        assert!(verify_block(&block, &chain, &ledger, &params, false).is_ok());

        assert_eq!(ledger.account(&sender).unwrap(), before);
        assert!(ledger.account("miner").unwrap().is_none());
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let mut block = mine(child(&chain), params.pow_floor_nibbles);
        block.timestamp += 1;

        assert!(matches!(
            verify_block(&block, &chain, &ledger, &params, false),
            Err(ConsensusError::HashMismatch { .. })
        ));
        assert!(ledger.account("miner").unwrap().is_none());
    }

    #[test]
    fn test_wrong_parent_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let mut block = child(&chain);
        block.parent_hash = "f".repeat(64);
        block.hash = block.get_hash();
        let block = mine(block, params.pow_floor_nibbles);

        assert!(matches!(
            verify_block(&block, &chain, &ledger, &params, false),
            Err(ConsensusError::WrongParent { .. })
        ));
    }

    #[test]
    fn test_insufficient_work_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = ChainParams {
            pow_floor_nibbles: 64,
            ..ChainParams::default()
        };
        let block = child(&chain);
        assert!(matches!(
            verify_block(&block, &chain, &ledger, &params, false),
            Err(ConsensusError::InsufficientWork(_))
        ));
    }

    #[test]
    fn test_wrong_difficulty_rejected() {
        let (_dir, ledger, mut chain) = setup();
        let params = params();
        chain.difficulty = 2;
        let block = mine(child(&chain), params.pow_floor_nibbles);
        assert!(matches!(
            verify_block(&block, &chain, &ledger, &params, false),
            Err(ConsensusError::WrongDifficulty {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_timestamp_window() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let parent_hash = chain.latest_block.as_ref().unwrap().hash.clone();

        let stale = Block::new(2, 1_000, Vec::new(), 1, parent_hash.clone(), "miner");
        assert!(matches!(
            verify_block(&mine(stale, 1), &chain, &ledger, &params, false),
            Err(ConsensusError::TimestampBeforeParent { .. })
        ));

        let future = Block::new(2, now_millis() + 60_000, Vec::new(), 1, parent_hash, "miner");
        assert!(matches!(
            verify_block(&mine(future, 1), &chain, &ledger, &params, false),
            Err(ConsensusError::TimestampInFuture { .. })
        ));
    }

    #[test]
    fn test_wrong_block_number_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let parent_hash = chain.latest_block.as_ref().unwrap().hash.clone();
        let block = Block::new(3, 2_000, Vec::new(), 1, parent_hash, "miner");
        assert!(matches!(
            verify_block(&mine(block, 1), &chain, &ledger, &params, false),
            Err(ConsensusError::WrongBlockNumber {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn test_tx_root_mismatch_rejected() {
        let (_dir, ledger, chain) = setup();
        let params = params();
        let mut block = child(&chain);
        block.tx_root = "0".repeat(64);
        block.hash = block.get_hash();
        assert!(matches!(
            verify_block(&mine(block, 1), &chain, &ledger, &params, false),
            Err(ConsensusError::TxRootMismatch)
        ));
    }

    #[test]
    fn test_empty_chain_rejected() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        let chain = ChainInfo::new(None, 1);
        let block = mine(Block::new(2, 2_000, Vec::new(), 1, "a".repeat(64), "m"), 1);
        assert!(matches!(
            verify_block(&block, &chain, &ledger, &params(), false),
            Err(ConsensusError::EmptyChain)
        ));
    }
}
