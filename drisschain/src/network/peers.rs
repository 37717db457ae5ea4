// Copyright (c) 2024 The Drisschain Developers

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::message::Message;

/// Outbound peer connections, keyed by the address they were dialled at.
///
/// Each entry is the sending half of a connection's writer task. Cloning
/// the registry shares the same set of peers.
#[derive(Clone)]
pub struct PeerRegistry {
    peers: Arc<Mutex<HashMap<String, UnboundedSender<String>>>>,
    max_peers: usize,
}

impl PeerRegistry {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
            max_peers,
        }
    }

    /// Register a connection. Returns false if the address is already
    /// connected or the registry is full.
    pub fn add(&self, address: &str, sender: UnboundedSender<String>) -> bool {
        let mut peers = self.peers.lock();
        if peers.contains_key(address) || peers.len() >= self.max_peers {
            return false;
        }
        peers.insert(address.to_string(), sender);
        debug!(%address, peers = peers.len(), "Peer added");
        true
    }

    pub fn remove(&self, address: &str) {
        if self.peers.lock().remove(address).is_some() {
            debug!(%address, "Peer removed");
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.lock().contains_key(address)
    }

    /// Whether another connection may be opened.
    pub fn has_capacity(&self) -> bool {
        self.peers.lock().len() < self.max_peers
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.peers.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Queue `message` for one peer. Returns false if it is not connected.
    pub fn send_to(&self, address: &str, message: &Message) -> bool {
        let Some(text) = encode(message) else {
            return false;
        };
        let mut peers = self.peers.lock();
        match peers.get(address) {
            Some(sender) if sender.send(text).is_ok() => true,
            Some(_) => {
                peers.remove(address);
                false
            }
            None => false,
        }
    }

    /// Queue `message` for every peer, dropping peers whose connection closed.
    pub fn broadcast(&self, message: &Message) {
        let Some(text) = encode(message) else {
            return;
        };
        self.peers
            .lock()
            .retain(|address, sender| match sender.send(text.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(%address, "Dropping closed peer");
                    false
                }
            });
    }
}

fn encode(message: &Message) -> Option<String> {
    match message.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "Failed to encode message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_registry_is_bounded() {
        let registry = PeerRegistry::new(2);
        let (a, _ra) = unbounded_channel();
        let (b, _rb) = unbounded_channel();
        let (c, _rc) = unbounded_channel();

        assert!(registry.add("ws://a", a.clone()));
        assert!(!registry.add("ws://a", a));
        assert!(registry.add("ws://b", b));
        assert!(!registry.has_capacity());
        assert!(!registry.add("ws://c", c));
        assert_eq!(registry.addresses(), vec!["ws://a", "ws://b"]);

        registry.remove("ws://a");
        assert!(!registry.contains("ws://a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_and_send_to() {
        let registry = PeerRegistry::new(3);
        let (a, mut ra) = unbounded_channel();
        let (b, mut rb) = unbounded_channel();
        registry.add("ws://a", a);
        registry.add("ws://b", b);

        let hello = Message::Handshake("ws://me".to_string());
        registry.broadcast(&hello);
        assert_eq!(ra.try_recv().unwrap(), hello.encode().unwrap());
        assert_eq!(rb.try_recv().unwrap(), hello.encode().unwrap());

        assert!(registry.send_to("ws://b", &hello));
        assert!(rb.try_recv().is_ok());
        assert!(ra.try_recv().is_err());
        assert!(!registry.send_to("ws://z", &hello));
    }

    #[test]
    fn test_closed_peers_are_dropped() {
        let registry = PeerRegistry::new(3);
        let (a, ra) = unbounded_channel();
        registry.add("ws://a", a);
        drop(ra);

        registry.broadcast(&Message::Handshake("ws://me".to_string()));
        assert!(registry.is_empty());
    }
}
