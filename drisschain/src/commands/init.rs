// Copyright (c) 2024 The Drisschain Developers

use anyhow::{bail, Result};
use dss_crypto_secp256k1::Secp256k1Keypair;
use rand::rngs::OsRng;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::crypto::address_from_public_key;

/// Run the init command
pub fn run(config_path: &Path) -> Result<()> {
    if Config::exists(config_path) {
        bail!(
            "Config already exists at {}\nUse a different --config path or delete the existing config.",
            config_path.display()
        );
    }

    let keypair = Secp256k1Keypair::generate(&mut OsRng);
    let address = address_from_public_key(&keypair.public_key_hex());

    let config = Config::new(keypair.secret_hex().to_string());
    config.save(config_path)?;

    info!("Node initialized at {}", config_path.display());
    println!("\nYour node key has been created.");
    println!("Config saved to: {}", config_path.display());
    println!("Address: {}", address);
    println!("\nNext steps:");
    println!("  1. Add peers under [network] in the config");
    println!("  2. Run 'drisschain run' to start the node");
    println!("  3. Run 'drisschain run --mine' to mine blocks");

    Ok(())
}
