// Copyright (c) 2024 The Drisschain Developers

use dss_consensus_pow::{search_nonce, SearchOutcome};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

use crate::block::Block;

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    pub total_hashes: u64,
    pub blocks_found: u64,
    pub start_time: Instant,
}

impl MiningStats {
    pub fn hashrate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_hashes as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Runs nonce searches on worker threads, one job per candidate block.
pub struct Miner {
    floor_nibbles: usize,
    total_hashes: Arc<AtomicU64>,
    blocks_found: Arc<AtomicU64>,
    start_time: Instant,
}

impl Miner {
    pub fn new(floor_nibbles: usize) -> Self {
        Self {
            floor_nibbles,
            total_hashes: Arc::new(AtomicU64::new(0)),
            blocks_found: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Start searching for a nonce that seals `block` at `difficulty`.
    pub fn mine(&self, mut block: Block, difficulty: u64) -> MiningJob {
        block.difficulty = difficulty;
        let parent_hash = block.parent_hash.clone();
        let number = block.block_number;

        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = channel();

        let floor = self.floor_nibbles;
        let worker_cancel = cancel.clone();
        let total_hashes = self.total_hashes.clone();
        let blocks_found = self.blocks_found.clone();

        let handle = thread::spawn(move || {
            let mut hashes = 0u64;
            let outcome = search_nonce(0, difficulty, floor, &worker_cancel, |nonce| {
                hashes += 1;
                block.hash_with_nonce(nonce)
            });
            total_hashes.fetch_add(hashes, Ordering::Relaxed);

            match outcome {
                SearchOutcome::Found { nonce, hash } => {
                    block.seal(nonce, hash);
                    blocks_found.fetch_add(1, Ordering::Relaxed);
                    info!(number = block.block_number, nonce, hashes, "Found block");
                    // The receiver is gone if the job was dropped meanwhile.
                    let _ = sender.send(block);
                }
                SearchOutcome::Cancelled => {
                    debug!(number = block.block_number, hashes, "Nonce search cancelled");
                }
            }
        });

        debug!(number, difficulty, "Started nonce search");
        MiningJob {
            parent_hash,
            cancel,
            receiver,
            handle: Some(handle),
        }
    }

    pub fn stats(&self) -> MiningStats {
        MiningStats {
            total_hashes: self.total_hashes.load(Ordering::Relaxed),
            blocks_found: self.blocks_found.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }
}

/// A running nonce search. Dropping the job cancels it.
pub struct MiningJob {
    parent_hash: String,
    cancel: Arc<AtomicBool>,
    receiver: Receiver<Block>,
    handle: Option<JoinHandle<()>>,
}

impl MiningJob {
    /// Hash of the block this job builds on.
    pub fn parent_hash(&self) -> &str {
        &self.parent_hash
    }

    /// The sealed block, if the search has finished.
    pub fn try_take(&self) -> Option<Block> {
        self.receiver.try_recv().ok()
    }

    /// Block until the search ends; `None` if it was cancelled.
    pub fn wait(mut self) -> Option<Block> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.receiver.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

impl Drop for MiningJob {
    fn drop(&mut self) {
        self.cancel();
    }
}
