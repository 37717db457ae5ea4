// Copyright (c) 2024 The Drisschain Developers

//! Drisschain node library - a minimal proof-of-work account chain.
//!
//! This library provides the block and transaction model, the `drisscript`
//! contract runtime, LMDB-backed state, the transaction pool, consensus
//! validation and the WebSocket gossip layer used by the node binary.

#![deny(clippy::print_stdout)]

pub mod block;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod ledger;
pub mod mempool;
pub mod merkle;
pub mod network;
pub mod node;
pub mod numeric;
pub mod query;
pub mod runtime;
pub mod telemetry;
pub mod transaction;
pub mod transition;

// Re-export commands module for CLI binary
pub mod commands;
