// Copyright (c) 2024 The Drisschain Developers

//! Dispatch of peer messages against the node state.
//!
//! Each message is handled to completion before the next one from the same
//! connection is read. The node mutex is only held inside the synchronous
//! part of a handler, never across an await.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::message::{BlockRequest, Message};
use super::peers::PeerRegistry;
use super::sync::{request_from_peers, SYNC_REQUEST_DELAY};
use super::transport;
use crate::block::Block;
use crate::node::{BlockOutcome, NodeState, SharedNode};
use crate::transaction::Transaction;

#[derive(Clone)]
pub struct Gossip {
    node: SharedNode,
    peers: PeerRegistry,
    my_address: String,
    /// Next block number expected from peers; `None` when not syncing
    sync_next: Arc<Mutex<Option<u64>>>,
    sync_delay: Duration,
}

impl Gossip {
    pub fn new(node: SharedNode, peers: PeerRegistry, my_address: impl Into<String>) -> Self {
        Self {
            node,
            peers,
            my_address: my_address.into(),
            sync_next: Arc::new(Mutex::new(None)),
            sync_delay: SYNC_REQUEST_DELAY,
        }
    }

    /// Override the pause between sync requests.
    pub fn with_sync_delay(mut self, delay: Duration) -> Self {
        self.sync_delay = delay;
        self
    }

    pub fn node(&self) -> &SharedNode {
        &self.node
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn my_address(&self) -> &str {
        &self.my_address
    }

    pub fn sync_delay(&self) -> Duration {
        self.sync_delay
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_next.lock().is_some()
    }

    /// Expect block `first` next from peers.
    pub fn begin_sync(&self, first: u64) {
        *self.sync_next.lock() = Some(first);
    }

    pub fn expected_sync_block(&self) -> Option<u64> {
        *self.sync_next.lock()
    }

    /// Decode and handle one text frame. Malformed frames are dropped.
    pub async fn handle_text(&self, text: &str) {
        match Message::decode(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => warn!(error = %e, "Dropping malformed peer message"),
        }
    }

    pub async fn handle(&self, message: Message) {
        match message {
            Message::NewBlock(block) => self.on_new_block(block),
            Message::CreateTransaction(tx) => self.on_transaction(tx),
            Message::RequestBlock(request) => self.on_block_request(request),
            Message::SendBlock(block) => self.on_sync_block(block),
            Message::Handshake(address) => self.on_handshake(address).await,
        }
    }

    fn on_new_block(&self, block: Block) {
        let result = {
            let mut node = self.node.lock();
            // Nothing to build on until sync has adopted a genesis block.
            if node.chain.latest_block.is_none() {
                debug!(number = block.block_number, "Ignoring block before genesis");
                return;
            }
            node.submit_block(block.clone())
        };

        match result {
            Ok(BlockOutcome::Accepted) => self.peers.broadcast(&Message::NewBlock(block)),
            Ok(BlockOutcome::AlreadySeen) => {}
            Err(e) => NodeState::log_rejection(&block, &e),
        }
    }

    fn on_transaction(&self, tx: Transaction) {
        if self.is_syncing() {
            return;
        }

        let result = self.node.lock().submit_transaction(tx.clone());
        match result {
            Ok(()) => {
                info!(hash = %tx.hash(), "Transaction pooled");
                self.peers.broadcast(&Message::CreateTransaction(tx));
            }
            Err(e) => debug!(hash = %tx.hash(), error = %e, "Transaction not pooled"),
        }
    }

    fn on_block_request(&self, request: BlockRequest) {
        if self.is_syncing() {
            return;
        }

        let result = self.node.lock().request_block_at(request.block_number);
        match result {
            Ok(Some(block)) => {
                if self
                    .peers
                    .send_to(&request.request_address, &Message::SendBlock(block))
                {
                    info!(
                        number = request.block_number,
                        to = %request.request_address,
                        "Sent block"
                    );
                } else {
                    debug!(to = %request.request_address, "Requester is not connected");
                }
            }
            Ok(None) => debug!(number = request.block_number, "Requested block not stored"),
            Err(e) => error!(number = request.block_number, error = %e, "Failed to read block"),
        }
    }

    fn on_sync_block(&self, block: Block) {
        let Some(expected) = self.expected_sync_block() else {
            return;
        };
        if block.block_number != expected {
            debug!(number = block.block_number, expected, "Ignoring out-of-order sync block");
            return;
        }

        let number = block.block_number;
        let result = self.node.lock().accept_sync_block(block.clone());
        match result {
            Ok(BlockOutcome::Accepted) => {
                info!(number, hash = %block.hash, "Synced block");
                let next = number + 1;
                self.begin_sync(next);
                tokio::spawn(request_from_peers(
                    self.peers.clone(),
                    next,
                    self.my_address.clone(),
                    self.sync_delay,
                ));
            }
            Ok(BlockOutcome::AlreadySeen) => {}
            Err(e) => NodeState::log_rejection(&block, &e),
        }
    }

    async fn on_handshake(&self, address: String) {
        match transport::connect(self, &address).await {
            Ok(true) => {}
            Ok(false) => debug!(%address, "Handshake ignored"),
            Err(e) => warn!(%address, error = %e, "Failed to connect to peer"),
        }
    }
}
