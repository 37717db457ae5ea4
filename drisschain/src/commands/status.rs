// Copyright (c) 2024 The Drisschain Developers

use anyhow::{Context, Result};
use dss_crypto_secp256k1::Secp256k1Keypair;
use std::path::Path;

use crate::block::GENESIS_DIFFICULTY;
use crate::config::Config;
use crate::crypto::address_from_public_key;
use crate::ledger::Ledger;
use crate::query::{BlockId, ChainQuery};

/// Show node and chain status
pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .context("No config found. Run 'drisschain init' first.")?;

    let address = config
        .private_key()
        .map(Secp256k1Keypair::from_hex)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid private key in config: {}", e))?
        .map(|keypair| address_from_public_key(&keypair.public_key_hex()));

    let ledger_path = config.ledger_path(config_path);
    let ledger = Ledger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger at {}", ledger_path.display()))?;
    let query = ChainQuery::new(&ledger);

    let height = query.block_number()?;
    let tip = query.block(BlockId::Number(height))?;
    let difficulty = ledger.difficulty()?.unwrap_or(GENESIS_DIFFICULTY);

    println!();
    println!("=== Drisschain Status ===");
    println!();
    println!("Node:");
    match &address {
        Some(address) => {
            let balance = query.balance(address)?.unwrap_or_default();
            println!("  Address: {}", address);
            println!("  Balance: {}", balance);
        }
        None => println!("  (No private key configured)"),
    }
    println!();
    println!("Chain:");
    println!("  Height: {}", height);
    match tip {
        Some(block) => println!("  Tip hash: {}", block.hash),
        None => println!("  Tip hash: (no blocks yet)"),
    }
    println!("  Difficulty: {}", difficulty);
    println!();
    println!("Network:");
    println!("  Listening port: {}", config.network.port);
    println!("  Address: {}", config.network.my_address);
    println!("  Configured peers: {}", config.network.peers.len());
    println!();
    println!("Mining:");
    println!(
        "  Enabled in config: {}",
        if config.mining.enabled { "yes" } else { "no" }
    );
    println!();

    Ok(())
}
