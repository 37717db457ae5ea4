// Copyright (c) 2024 The Drisschain Developers

use dss_consensus_pow::{is_retarget_height, retarget, RETARGET_INTERVAL};
use tracing::info;

use crate::block::Block;
use crate::config::ChainParams;
use crate::ledger::{Ledger, LedgerError};
use crate::node::ChainInfo;

/// Difficulty the block after `block` must carry.
///
/// Retargets when `block` closes a window, which runs from block `n - 9` to
/// `block` itself. Nothing is written; the caller commits the value with the
/// block.
pub fn update_difficulty(
    block: &Block,
    chain: &ChainInfo,
    ledger: &Ledger,
    params: &ChainParams,
) -> Result<u64, LedgerError> {
    if !is_retarget_height(block.block_number) {
        return Ok(chain.difficulty);
    }

    let start_number = block.block_number - (RETARGET_INTERVAL - 1);
    let window_start = ledger
        .get_block(start_number)?
        .ok_or(LedgerError::BlockNotFound(start_number))?;

    let previous = chain.difficulty;
    let next = retarget(
        previous,
        window_start.timestamp,
        block.timestamp,
        params.block_time_ms,
    );

    info!(
        number = block.block_number,
        previous,
        next,
        span_ms = block.timestamp.saturating_sub(window_start.timestamp),
        "Retargeted difficulty"
    );
    Ok(next)
}
