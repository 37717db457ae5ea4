// Copyright (c) 2024 The Drisschain Developers

//! Proof-of-Work consensus module for Drisschain.
//!
//! This crate implements the PoW target and difficulty adjustment rules.
//! It provides:
//!
//! - The leading-zero target derived from a difficulty value
//! - The periodic retargeting formula
//! - A cancelable nonce search over any block hashing function

#![deny(missing_docs)]

pub mod difficulty;
pub mod search;

pub use difficulty::{
    check_pow, extra_zero_nibbles, is_retarget_height, meets_target, retarget, target_prefix,
    PowError, DEFAULT_FLOOR_NIBBLES, GENESIS_DIFFICULTY, RETARGET_INTERVAL,
};
pub use search::{search_nonce, SearchOutcome};
