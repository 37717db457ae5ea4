// Copyright (c) 2024 The Drisschain Developers

//! The node's chain state and the operations peers drive it with.
//!
//! Every mutation goes through [`NodeState`], which callers keep behind a
//! single [`SharedNode`] mutex: blocks and transactions are applied one at a
//! time and never interleave.

mod chain_info;
mod miner;

pub use chain_info::ChainInfo;
pub use miner::{Miner, MiningJob, MiningStats};

use num_bigint::BigUint;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::block::{Block, GENESIS_DIFFICULTY};
use crate::config::ChainParams;
use crate::consensus::{now_millis, update_difficulty, verify_block, BlockBuilder, ConsensusError};
use crate::ledger::{AccountRecord, Ledger, LedgerError, StateChanges, StateReader};
use crate::mempool::MempoolError;
use crate::transaction::Transaction;

pub type SharedNode = Arc<Mutex<NodeState>>;

/// Result of submitting a block that did not fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Verified and committed as the new tip.
    Accepted,
    /// The hash was already seen; nothing was done.
    AlreadySeen,
}

/// Chain state owned by a running node.
pub struct NodeState {
    pub ledger: Ledger,
    pub chain: ChainInfo,
    pub params: ChainParams,
    /// Emit contract `log` output
    pub logging: bool,
    miner: Miner,
    mining: Option<MiningJob>,
}

impl NodeState {
    /// Wrap an opened ledger, restoring the tip and difficulty from it.
    pub fn open(ledger: Ledger, params: ChainParams, logging: bool) -> Result<Self, LedgerError> {
        let chain = ChainInfo::load(&ledger)?;
        let miner = Miner::new(params.pow_floor_nibbles);
        Ok(Self {
            ledger,
            chain,
            params,
            logging,
            miner,
            mining: None,
        })
    }

    pub fn into_shared(self) -> SharedNode {
        Arc::new(Mutex::new(self))
    }

    /// Create the genesis block on an empty ledger.
    ///
    /// The first account is credited with the initial supply directly; the
    /// genesis block itself carries no transactions and pays no reward.
    /// Does nothing if a block is already stored.
    pub fn bootstrap(&mut self) -> Result<(), LedgerError> {
        if self.ledger.height()? > 0 {
            return Ok(());
        }

        let timestamp = self.params.genesis_timestamp.unwrap_or_else(now_millis);
        let genesis = Block::genesis(&self.params.first_account, timestamp);
        self.adopt_genesis(genesis)
    }

    /// Commit `genesis` together with the initial supply of the first account.
    fn adopt_genesis(&mut self, genesis: Block) -> Result<(), LedgerError> {
        let mut changes = StateChanges::default();
        changes.accounts.insert(
            self.params.first_account.clone(),
            AccountRecord::with_balance(self.params.initial_supply.clone()),
        );
        self.ledger.commit_block(&genesis, &changes, GENESIS_DIFFICULTY)?;

        info!(
            hash = %genesis.hash,
            address = %self.params.first_account,
            supply = %self.params.initial_supply,
            "Created genesis block"
        );
        self.chain.difficulty = GENESIS_DIFFICULTY;
        self.chain.latest_block = Some(genesis);
        Ok(())
    }

    /// Validate and commit a block received from a peer or the miner.
    ///
    /// A hash seen before is not validated again, whatever the earlier
    /// verdict was. An accepted block cancels the running nonce search.
    pub fn submit_block(&mut self, block: Block) -> Result<BlockOutcome, ConsensusError> {
        if !self.chain.checked_blocks.insert(block.hash.clone()) {
            debug!(hash = %block.hash, "Block already seen");
            return Ok(BlockOutcome::AlreadySeen);
        }

        let changes = verify_block(&block, &self.chain, &self.ledger, &self.params, self.logging)?;
        self.cancel_mining();
        self.commit_block(block, changes)?;
        Ok(BlockOutcome::Accepted)
    }

    /// Make a verified block the new tip.
    ///
    /// The block, its state changes and the next difficulty land in one
    /// ledger transaction.
    fn commit_block(&mut self, block: Block, changes: StateChanges) -> Result<(), LedgerError> {
        let difficulty = update_difficulty(&block, &self.chain, &self.ledger, &self.params)?;
        self.ledger.commit_block(&block, &changes, difficulty)?;
        self.chain.difficulty = difficulty;

        info!(
            number = block.block_number,
            hash = %block.hash,
            txs = block.transactions.len(),
            difficulty = self.chain.difficulty,
            "Committed block"
        );

        self.chain.latest_block = Some(block);
        self.chain
            .tx_pool
            .evict_stale(&self.ledger, &self.params)?;
        Ok(())
    }

    /// Weakly validate `tx` and add it to the pool.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        self.chain.tx_pool.admit(tx, &self.ledger, &self.params)
    }

    /// A stored block for a peer; `None` outside `1..=height`.
    pub fn request_block_at(&self, number: u64) -> Result<Option<Block>, LedgerError> {
        if number == 0 || number > self.ledger.height()? {
            return Ok(None);
        }
        self.ledger.get_block(number)
    }

    /// Prepare to sync and return the first block number to request.
    ///
    /// On an empty ledger the first block received is adopted as genesis and
    /// credits the first account like a local bootstrap would.
    pub fn start_sync(&mut self) -> Result<u64, LedgerError> {
        let height = self.ledger.height()?;
        self.chain.latest_sync_block = self.chain.latest_block.clone();
        Ok(height + 1)
    }

    /// Apply a block received in reply to a sync request.
    ///
    /// The first block of a sync onto an empty ledger is taken as genesis
    /// after a structural check; every later block is fully verified. Blocks
    /// at or below the tip are replies already superseded and are ignored,
    /// even if the same hash was turned away earlier as gossip.
    pub fn accept_sync_block(&mut self, block: Block) -> Result<BlockOutcome, ConsensusError> {
        if block.block_number <= self.chain.height() {
            return Ok(BlockOutcome::AlreadySeen);
        }

        let adopt = self.chain.latest_sync_block.is_none()
            && self.ledger.height()? == 0
            && block.block_number == 1;

        if adopt {
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
            self.chain.checked_blocks.insert(block.hash.clone());
            self.adopt_genesis(block)?;
        } else {
            let changes =
                verify_block(&block, &self.chain, &self.ledger, &self.params, self.logging)?;
            self.chain.checked_blocks.insert(block.hash.clone());
            self.commit_block(block, changes)?;
        }

        self.chain.latest_sync_block = self.chain.latest_block.clone();
        Ok(BlockOutcome::Accepted)
    }

    /// Assemble a candidate block on the tip paying `coinbase`.
    pub fn assemble_block(&self, coinbase: &str, timestamp: u64) -> Result<Block, ConsensusError> {
        let built = BlockBuilder::assemble(
            &self.chain,
            &self.ledger,
            &self.params.block_gas_limit,
            coinbase,
            timestamp,
            self.logging,
        )?;
        Ok(built.block)
    }

    /// Start mining on the current tip unless a search on it is already running.
    ///
    /// Returns whether a new search was started.
    pub fn start_mining(&mut self, coinbase: &str) -> Result<bool, ConsensusError> {
        let Some(tip) = self.chain.tip_hash() else {
            return Ok(false);
        };
        if self
            .mining
            .as_ref()
            .is_some_and(|job| job.parent_hash() == tip && !job.is_cancelled())
        {
            return Ok(false);
        }

        // A timestamp equal to the parent's would be rejected.
        let parent_time = self.chain.latest_block.as_ref().map_or(0, |b| b.timestamp);
        let timestamp = now_millis().max(parent_time + 1);

        let candidate = self.assemble_block(coinbase, timestamp)?;
        self.mining = Some(self.miner.mine(candidate, self.chain.difficulty));
        Ok(true)
    }

    /// Take a block the running search has sealed, if any.
    pub fn take_mined_block(&mut self) -> Option<Block> {
        let block = self.mining.as_ref()?.try_take()?;
        self.mining = None;
        Some(block)
    }

    pub fn cancel_mining(&mut self) {
        if let Some(job) = self.mining.take() {
            debug!(parent = %job.parent_hash(), "Cancelling nonce search");
            job.cancel();
        }
    }

    pub fn is_mining(&self) -> bool {
        self.mining.is_some()
    }

    pub fn mining_stats(&self) -> MiningStats {
        self.miner.stats()
    }

    /// Balance of `address` in committed state.
    pub fn balance_of(&self, address: &str) -> Result<Option<BigUint>, LedgerError> {
        Ok(self.ledger.account(address)?.map(|a| a.balance))
    }

    /// Log a failed block submission at the level its cause deserves.
    pub fn log_rejection(block: &Block, error: &ConsensusError) {
        if error.is_storage_failure() {
            error!(number = block.block_number, error = %error, "Storage failure while applying block");
        } else {
            warn!(number = block.block_number, hash = %block.hash, error = %error, "Block rejected");
        }
    }
}
