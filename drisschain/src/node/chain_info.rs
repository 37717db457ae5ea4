// Copyright (c) 2024 The Drisschain Developers

use std::collections::HashSet;

use crate::block::{Block, GENESIS_DIFFICULTY};
use crate::ledger::{Ledger, LedgerError};
use crate::mempool::TxPool;

/// In-memory view of the chain tip and pending work.
#[derive(Debug, Clone, Default)]
pub struct ChainInfo {
    pub tx_pool: TxPool,
    /// Current tip; `None` until a genesis block exists
    pub latest_block: Option<Block>,
    /// Last block accepted through sync, while syncing
    pub latest_sync_block: Option<Block>,
    /// Hashes of blocks already seen via gossip
    pub checked_blocks: HashSet<String>,
    /// Difficulty the next block must carry
    pub difficulty: u64,
}

impl ChainInfo {
    pub fn new(latest_block: Option<Block>, difficulty: u64) -> Self {
        Self {
            latest_block,
            difficulty,
            ..Self::default()
        }
    }

    /// Restore from the last persisted block and difficulty.
    pub fn load(ledger: &Ledger) -> Result<Self, LedgerError> {
        let difficulty = ledger.difficulty()?.unwrap_or(GENESIS_DIFFICULTY);
        Ok(Self::new(ledger.latest_block()?, difficulty))
    }

    pub fn height(&self) -> u64 {
        self.latest_block.as_ref().map_or(0, |b| b.block_number)
    }

    pub fn tip_hash(&self) -> Option<&str> {
        self.latest_block.as_ref().map(|b| b.hash.as_str())
    }
}
