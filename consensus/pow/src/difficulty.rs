// Copyright (c) 2024 The Drisschain Developers

//! Difficulty target and retargeting for Drisschain PoW mining.
//!
//! A block hash meets the target when its hex form starts with a run of zero
//! nibbles: a fixed protocol floor plus `floor(log16(difficulty))` extra
//! zeros. Every [`RETARGET_INTERVAL`] blocks the difficulty is scaled by how
//! far the observed block time drifted from the configured target.

use displaydoc::Display;

/// Zero nibbles every block hash needs regardless of difficulty.
pub const DEFAULT_FLOOR_NIBBLES: usize = 5;

/// Difficulty of the genesis block.
pub const GENESIS_DIFFICULTY: u64 = 1;

/// Number of blocks between difficulty adjustments.
pub const RETARGET_INTERVAL: u64 = 10;

/// Errors from checking a block hash against the target.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum PowError {
    /// hash `{hash}` lacks the {required} leading zero nibbles required by difficulty {difficulty}
    InsufficientWork {
        /// The offending hash.
        hash: String,
        /// Number of leading zeros the target requires.
        required: usize,
        /// Difficulty the hash was checked against.
        difficulty: u64,
    },
}

impl std::error::Error for PowError {}

/// `floor(log16(difficulty))`, computed exactly on integers.
///
/// A difficulty of zero contributes no extra zeros.
pub fn extra_zero_nibbles(difficulty: u64) -> usize {
    if difficulty == 0 {
        return 0;
    }
    let bit_len = u64::BITS - difficulty.leading_zeros();
    ((bit_len - 1) / 4) as usize
}

/// The zero-nibble prefix a block hash must start with.
pub fn target_prefix(difficulty: u64, floor_nibbles: usize) -> String {
    "0".repeat(floor_nibbles + extra_zero_nibbles(difficulty))
}

/// Whether `hash_hex` satisfies the target for `difficulty`.
pub fn meets_target(hash_hex: &str, difficulty: u64, floor_nibbles: usize) -> bool {
    let required = floor_nibbles + extra_zero_nibbles(difficulty);
    hash_hex.len() >= required && hash_hex.bytes().take(required).all(|b| b == b'0')
}

/// Like [`meets_target`] but reports how the hash fell short.
pub fn check_pow(hash_hex: &str, difficulty: u64, floor_nibbles: usize) -> Result<(), PowError> {
    if meets_target(hash_hex, difficulty, floor_nibbles) {
        Ok(())
    } else {
        Err(PowError::InsufficientWork {
            hash: hash_hex.to_string(),
            required: floor_nibbles + extra_zero_nibbles(difficulty),
            difficulty,
        })
    }
}

/// Whether the block at `block_number` triggers a difficulty adjustment.
pub fn is_retarget_height(block_number: u64) -> bool {
    block_number != 0 && block_number % RETARGET_INTERVAL == 0
}

/// Compute the next difficulty after a retarget window.
///
/// `window_start` is the timestamp of block `n - 9` and `window_end` the
/// timestamp of block `n`, both in milliseconds. The result is
/// `ceil(current * RETARGET_INTERVAL * block_time_ms / (window_end - window_start))`.
///
/// A window that does not move forward in time keeps the current difficulty,
/// and the result never drops below 1.
pub fn retarget(current: u64, window_start: u64, window_end: u64, block_time_ms: u64) -> u64 {
    if window_end <= window_start {
        return current.max(1);
    }

    let span = (window_end - window_start) as u128;
    let scaled = current as u128 * RETARGET_INTERVAL as u128 * block_time_ms as u128;
    let next = scaled.div_ceil(span);

    u64::try_from(next).unwrap_or(u64::MAX).max(1)
}
