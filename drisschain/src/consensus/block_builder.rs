// Copyright (c) 2024 The Drisschain Developers

//! Block builder for assembling a candidate block from the transaction pool.
//!
//! The pool is walked in arrival order and every transaction is replayed on
//! the same overlays block validation uses, so a candidate only carries
//! transactions that will replay cleanly. Mining the result is left to
//! [`crate::node::Miner`].

use num_bigint::BigUint;
use std::collections::HashSet;
use tracing::{debug, info};

use super::ConsensusError;
use crate::block::Block;
use crate::ledger::StateReader;
use crate::node::ChainInfo;
use crate::transition::Replay;

/// A candidate block plus the senders left out of it.
#[derive(Debug)]
pub struct BuiltBlock {
    pub block: Block,
    /// Senders whose transactions were dropped because one of them failed
    pub skipped_senders: HashSet<String>,
}

/// Assembles unsealed candidate blocks on top of the chain tip.
pub struct BlockBuilder;

impl BlockBuilder {
    /// Build the next block paying `coinbase`, stamped with `timestamp`.
    ///
    /// Transactions are taken until the next one would bring the total
    /// contract gas to or over `block_gas_limit`. A sender that is a contract
    /// or cannot pay is skipped along with all of its later transactions.
    pub fn assemble<R: StateReader>(
        chain: &ChainInfo,
        reader: &R,
        block_gas_limit: &BigUint,
        coinbase: &str,
        timestamp: u64,
        logging: bool,
    ) -> Result<BuiltBlock, ConsensusError> {
        let parent = chain.latest_block.as_ref().ok_or(ConsensusError::EmptyChain)?;

        // Contracts see the header the finished block will carry.
        let header = Block::new(
            parent.block_number + 1,
            timestamp,
            Vec::new(),
            chain.difficulty,
            parent.hash.clone(),
            coinbase,
        );

        let mut replay = Replay::new(reader, logging);
        let mut skipped = HashSet::new();
        let mut contract_gas = BigUint::default();
        let mut transactions = Vec::new();

        for entry in chain.tx_pool.entries() {
            if skipped.contains(&entry.sender) {
                continue;
            }

            let tx_contract_gas = entry.tx.contract_gas();
            if &contract_gas + &tx_contract_gas >= *block_gas_limit {
                debug!(hash = %entry.hash, "Block gas limit reached");
                break;
            }

            match replay.apply_tx(&entry.tx, &entry.sender, &header) {
                Ok(()) => {
                    contract_gas += tx_contract_gas;
                    transactions.push(entry.tx.clone());
                }
                Err(e) if e.is_sender_fault() => {
                    debug!(sender = %entry.sender, error = %e, "Skipping sender");
                    skipped.insert(entry.sender.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let block = Block::new(
            header.block_number,
            timestamp,
            transactions,
            chain.difficulty,
            header.parent_hash,
            coinbase,
        );

        info!(
            number = block.block_number,
            txs = block.transactions.len(),
            skipped = skipped.len(),
            "Assembled candidate block"
        );

        Ok(BuiltBlock {
            block,
            skipped_senders: skipped,
        })
    }
}
