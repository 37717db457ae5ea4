// Copyright (c) 2024 The Drisschain Developers

use anyhow::{anyhow, Context, Result};
use dss_crypto_secp256k1::Secp256k1Keypair;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::crypto::address_from_public_key;
use crate::ledger::Ledger;
use crate::network::{self, Gossip, Message, PeerRegistry};
use crate::node::{BlockOutcome, NodeState};

/// How often the loop checks for a sealed block and for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the node
pub fn run(config_path: &Path, mine: bool, sync: bool) -> Result<()> {
    let config = Config::load(config_path).context("No config found. Run 'drisschain init' first.")?;

    let mine = mine || config.mining.enabled;
    let sync = sync || config.sync.enabled;

    println!("Drisschain node starting. Press Ctrl+C to stop.");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config, config_path, mine, sync).await })
}

async fn run_async(config: Config, config_path: &Path, mine: bool, sync: bool) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })?;

    let private_key = config
        .private_key()
        .context("No private key configured. Run 'drisschain init' first.")?;
    let keypair = Secp256k1Keypair::from_hex(private_key)
        .map_err(|e| anyhow!("Invalid private key in config: {}", e))?;
    let address = address_from_public_key(&keypair.public_key_hex());

    let ledger_path = config.ledger_path(config_path);
    let ledger = Ledger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger at {}", ledger_path.display()))?;
    let mut state = NodeState::open(ledger, config.chain.clone(), config.logging.contract_logs)?;

    // A syncing node takes its genesis block from peers.
    if !sync {
        state.bootstrap()?;
    }
    let node = state.into_shared();

    let peers = PeerRegistry::new(config.network.max_peers);
    let gossip = Gossip::new(node.clone(), peers, config.network.my_address.clone());

    let listener = network::bind(config.network.port).await?;
    let server_gossip = gossip.clone();
    tokio::spawn(async move {
        if let Err(e) = network::serve(listener, server_gossip).await {
            error!("Peer server error: {}", e);
        }
    });

    for peer in &config.network.peers {
        if let Err(e) = network::connect(&gossip, peer).await {
            warn!(%peer, error = %e, "Failed to connect to peer");
        }
    }

    if sync {
        let sync_gossip = gossip.clone();
        tokio::spawn(async move {
            if let Err(e) = network::chain_request(sync_gossip).await {
                error!("Chain sync failed: {}", e);
            }
        });
    }

    let mine = if mine && sync {
        warn!("Mining is disabled while syncing from peers");
        false
    } else {
        mine
    };
    if mine {
        info!(coinbase = %address, "Mining enabled");
    }

    println!();
    println!("Node address: {}", address);
    println!("Listening on port {} as {}", config.network.port, config.network.my_address);
    println!("Connected peers: {}", gossip.peers().len());
    println!();

    let block_time = Duration::from_millis(config.chain.block_time_ms.max(1));
    let mut mine_timer = tokio::time::interval(block_time);

    while !shutdown.load(Ordering::SeqCst) {
        tokio::select! {
            _ = mine_timer.tick(), if mine => {
                let started = node.lock().start_mining(&address);
                match started {
                    Ok(true) => debug!("Started mining on new tip"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Failed to assemble block"),
                }
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                if mine {
                    publish_mined_block(&gossip);
                }
            }
        }
    }

    info!("Shutting down");
    node.lock().cancel_mining();

    let stats = node.lock().mining_stats();
    if stats.blocks_found > 0 {
        println!(
            "Mined {} blocks ({:.0} H/s average)",
            stats.blocks_found,
            stats.hashrate()
        );
    }

    Ok(())
}

/// Commit a block our own search sealed and announce it.
fn publish_mined_block(gossip: &Gossip) {
    let mined = gossip.node().lock().take_mined_block();
    let Some(block) = mined else {
        return;
    };

    let result = gossip.node().lock().submit_block(block.clone());
    match result {
        Ok(BlockOutcome::Accepted) => {
            info!(number = block.block_number, hash = %block.hash, "Mined block");
            gossip.peers().broadcast(&Message::NewBlock(block));
        }
        Ok(BlockOutcome::AlreadySeen) => {}
        Err(e) => NodeState::log_rejection(&block, &e),
    }
}
