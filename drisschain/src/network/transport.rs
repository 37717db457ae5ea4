// Copyright (c) 2024 The Drisschain Developers

//! WebSocket server and outbound peer connections.
//!
//! Inbound connections only deliver messages to [`Gossip`]. Outbound
//! connections are the ones registered in the [`PeerRegistry`](super::PeerRegistry)
//! and carry everything this node sends.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{debug, error, info, warn};

use super::gossip::Gossip;
use super::message::{Message, MessageError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

/// Bind the peer server on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener, TransportError> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(port, "WebSocket server listening");
    Ok(listener)
}

/// Accept peer connections forever, one task per connection.
pub async fn serve(listener: TcpListener, gossip: Gossip) -> Result<(), TransportError> {
    loop {
        let (stream, remote) = listener.accept().await?;
        let gossip = gossip.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_inbound(stream, gossip).await {
                debug!(%remote, error = %e, "Inbound connection ended");
            }
        });
    }
}

async fn handle_inbound(stream: TcpStream, gossip: Gossip) -> Result<(), TransportError> {
    let ws = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws.split();

    while let Some(frame) = ws_receiver.next().await {
        match frame? {
            WsMessage::Text(text) => gossip.handle_text(&text).await,
            WsMessage::Ping(data) => ws_sender.send(WsMessage::Pong(data)).await?,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Open an outbound connection to `address` and introduce ourselves.
///
/// The new peer receives a handshake for our own address and for every
/// peer already connected, and the existing peers are told about the new
/// one. Returns false without dialling if `address` is our own, already
/// connected, or the registry is full.
pub async fn connect(gossip: &Gossip, address: &str) -> Result<bool, TransportError> {
    let peers = gossip.peers();
    if address == gossip.my_address() || peers.contains(address) || !peers.has_capacity() {
        return Ok(false);
    }

    let (ws, _) = connect_async(address).await?;
    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (sender, mut outgoing) = unbounded_channel::<String>();

    let known = peers.addresses();
    for introduced in std::iter::once(gossip.my_address().to_string()).chain(known) {
        // Queued until the writer task below starts draining.
        let _ = sender.send(Message::Handshake(introduced).encode()?);
    }
    peers.broadcast(&Message::Handshake(address.to_string()));

    if !peers.add(address, sender) {
        return Ok(false);
    }
    info!(%address, "Connected to peer");

    tokio::spawn(async move {
        while let Some(text) = outgoing.recv().await {
            if let Err(e) = ws_sender.send(WsMessage::Text(text.into())).await {
                error!(error = %e, "Failed to send to peer");
                break;
            }
        }
    });

    let registry = peers.clone();
    let address = address.to_string();
    tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(%address, error = %e, "Peer connection failed");
                    break;
                }
            }
        }
        registry.remove(&address);
        info!(%address, "Disconnected from peer");
    });

    Ok(true)
}
