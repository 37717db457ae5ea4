// Copyright (c) 2024 The Drisschain Developers

//! Catching up with peers by requesting blocks one number at a time.

use std::time::Duration;
use tracing::{debug, info};

use super::gossip::Gossip;
use super::message::{BlockRequest, Message};
use super::peers::PeerRegistry;
use crate::ledger::LedgerError;

/// Pause between successive requests, and before the first one.
pub const SYNC_REQUEST_DELAY: Duration = Duration::from_secs(5);

/// Ask every connected peer for block `number`, one peer at a time.
pub async fn request_from_peers(
    peers: PeerRegistry,
    number: u64,
    my_address: String,
    delay: Duration,
) {
    let request = Message::RequestBlock(BlockRequest {
        block_number: number,
        request_address: my_address,
    });

    for address in peers.addresses() {
        if peers.send_to(&address, &request) {
            debug!(number, %address, "Requested block");
        }
        tokio::time::sleep(delay).await;
    }
}

/// Start syncing from the block after the local tip.
///
/// Waits one delay first so that startup connections can open, then asks
/// each peer in turn. Replies are handled as they arrive and each accepted
/// block triggers the request for the next one.
pub async fn chain_request(gossip: Gossip) -> Result<(), LedgerError> {
    let first = gossip.node().lock().start_sync()?;
    gossip.begin_sync(first);
    info!(first, "Requesting chain from peers");

    tokio::time::sleep(gossip.sync_delay()).await;
    request_from_peers(
        gossip.peers().clone(),
        first,
        gossip.my_address().to_string(),
        gossip.sync_delay(),
    )
    .await;
    Ok(())
}
