// Copyright (c) 2024 The Drisschain Developers

//! Brute-force nonce search.

use crate::difficulty::meets_target;
use std::sync::atomic::{AtomicBool, Ordering};

/// How often the cancel flag is polled, in hashes.
const CANCEL_POLL_INTERVAL: u64 = 1024;

/// Result of a nonce search.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchOutcome {
    /// A nonce whose hash meets the target.
    Found {
        /// The winning nonce.
        nonce: u64,
        /// The hash produced with that nonce.
        hash: String,
    },
    /// The search was cancelled before a nonce was found.
    Cancelled,
}

/// Increment the nonce from `start` until `hash_at(nonce)` meets the target.
///
/// `cancel` is polled periodically; once it is set the search stops and
/// returns [`SearchOutcome::Cancelled`].
pub fn search_nonce<F>(
    start: u64,
    difficulty: u64,
    floor_nibbles: usize,
    cancel: &AtomicBool,
    mut hash_at: F,
) -> SearchOutcome
where
    F: FnMut(u64) -> String,
{
    let mut nonce = start;
    let mut polled = 0u64;

    loop {
        if polled % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return SearchOutcome::Cancelled;
        }

        let hash = hash_at(nonce);
        if meets_target(&hash, difficulty, floor_nibbles) {
            return SearchOutcome::Found { nonce, hash };
        }

        nonce = nonce.wrapping_add(1);
        polled = polled.wrapping_add(1);
        if nonce == start {
            // Every nonce was tried.
            return SearchOutcome::Cancelled;
        }
    }
}
