// Copyright (c) 2024 The Drisschain Developers

//! Proof-of-work consensus for Drisschain.
//!
//! This module provides:
//! - `verify_block`: the gate every block passes before it joins the chain
//! - `update_difficulty`: retargeting every tenth block
//! - `BlockBuilder`: assembling a candidate block from the pool

mod block_builder;
mod difficulty;
mod validation;

pub use block_builder::{BlockBuilder, BuiltBlock};
pub use difficulty::update_difficulty;
pub use validation::{verify_block, ConsensusError};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
