// Copyright (c) 2024 The Drisschain Developers
//
//! Shared helpers for node integration tests.
//!
//! Nodes are built on throwaway LMDB directories with a one-nibble PoW
//! floor so that blocks can be sealed with a real nonce search in a few
//! hashes.

#![allow(dead_code)]

use num_bigint::BigUint;
use rand::rngs::OsRng;
use tempfile::TempDir;

use drisschain::block::Block;
use drisschain::config::ChainParams;
use drisschain::crypto::{address_from_public_key, sha256_hex};
use drisschain::ledger::{Ledger, StateReader};
use drisschain::node::{Miner, NodeState};
use drisschain::transaction::{AdditionalData, Transaction};
use dss_crypto_secp256k1::Secp256k1Keypair;

/// Minimum gas accepted by default chain parameters.
pub const MIN_GAS: u64 = 2_000_000_000;

/// Genesis timestamp shared by every test chain.
pub const GENESIS_TIME: u64 = 1_000;

pub struct TestAccount {
    pub keypair: Secp256k1Keypair,
    pub address: String,
}

impl TestAccount {
    pub fn generate() -> Self {
        let keypair = Secp256k1Keypair::generate(&mut OsRng);
        let address = address_from_public_key(&keypair.public_key_hex());
        Self { keypair, address }
    }

    /// A signed transfer to `recipient`.
    pub fn transfer(&self, recipient: &str, amount: u64, nonce: u64) -> Transaction {
        self.sign(Transaction::new(
            recipient,
            BigUint::from(amount),
            BigUint::from(MIN_GAS),
            AdditionalData::default(),
            nonce,
        ))
    }

    /// A signed transaction carrying `data`.
    pub fn with_data(
        &self,
        recipient: &str,
        amount: u64,
        data: AdditionalData,
        nonce: u64,
    ) -> Transaction {
        self.sign(Transaction::new(
            recipient,
            BigUint::from(amount),
            BigUint::from(MIN_GAS),
            data,
            nonce,
        ))
    }

    fn sign(&self, mut tx: Transaction) -> Transaction {
        tx.sign(&self.keypair).unwrap();
        tx
    }
}

/// A well-formed address for an account nobody holds a key to.
pub fn address(name: &str) -> String {
    sha256_hex(name)
}

/// Chain parameters for tests: cheap PoW and a pinned genesis.
pub fn test_params(first_account: &str) -> ChainParams {
    ChainParams {
        first_account: first_account.to_string(),
        genesis_timestamp: Some(GENESIS_TIME),
        pow_floor_nibbles: 1,
        ..ChainParams::default()
    }
}

/// A node on a fresh ledger, not yet bootstrapped.
pub fn open_node(params: ChainParams) -> (TempDir, NodeState) {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(dir.path()).unwrap();
    (dir, NodeState::open(ledger, params, false).unwrap())
}

/// A bootstrapped node whose first account is `funder`.
pub fn funded_node(funder: &TestAccount) -> (TempDir, NodeState) {
    let (dir, mut node) = open_node(test_params(&funder.address));
    node.bootstrap().unwrap();
    (dir, node)
}

/// Assemble the next block from the pool and seal it.
///
/// Timestamps advance one millisecond per block from the parent, so they
/// always lie in the past.
pub fn mine_next(node: &NodeState, coinbase: &str) -> Block {
    let parent = node.chain.latest_block.as_ref().unwrap();
    let candidate = node.assemble_block(coinbase, parent.timestamp + 1).unwrap();
    seal(node, candidate)
}

/// Seal `block` at the node's current difficulty.
pub fn seal(node: &NodeState, block: Block) -> Block {
    Miner::new(node.params.pow_floor_nibbles)
        .mine(block, node.chain.difficulty)
        .wait()
        .unwrap()
}

pub fn balance(node: &NodeState, address: &str) -> BigUint {
    node.ledger
        .account(address)
        .unwrap()
        .map(|a| a.balance)
        .unwrap_or_default()
}

pub fn nonce(node: &NodeState, address: &str) -> u64 {
    node.ledger
        .account(address)
        .unwrap()
        .map(|a| a.nonce)
        .unwrap_or_default()
}
