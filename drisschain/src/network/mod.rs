// Copyright (c) 2024 The Drisschain Developers

//! Peer-to-peer networking: JSON messages over WebSocket.

mod gossip;
mod message;
mod peers;
mod sync;
mod transport;

pub use gossip::Gossip;
pub use message::{
    BlockRequest, Message, MessageError, CREATE_TRANSACTION, HANDSHAKE, NEW_BLOCK, REQUEST_BLOCK,
    SEND_BLOCK,
};
pub use peers::PeerRegistry;
pub use sync::{chain_request, request_from_peers, SYNC_REQUEST_DELAY};
pub use transport::{bind, connect, serve, TransportError};
