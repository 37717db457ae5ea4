// Copyright (c) 2024 The Drisschain Developers

//! Peer message encoding.
//!
//! Every message is a JSON object `{"type": <tag>, "data": <payload>}` with a
//! numeric tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::block::Block;
use crate::transaction::Transaction;

pub const NEW_BLOCK: u8 = 0;
pub const CREATE_TRANSACTION: u8 = 1;
pub const REQUEST_BLOCK: u8 = 2;
pub const SEND_BLOCK: u8 = 3;
pub const HANDSHAKE: u8 = 4;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown message type {0}")]
    UnknownType(u8),
}

/// Payload of a block request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    pub block_number: u64,
    /// Address the block should be sent back to
    pub request_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    NewBlock(Block),
    CreateTransaction(Transaction),
    RequestBlock(BlockRequest),
    SendBlock(Block),
    Handshake(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: u8,
    data: Value,
}

impl Message {
    pub fn kind(&self) -> u8 {
        match self {
            Message::NewBlock(_) => NEW_BLOCK,
            Message::CreateTransaction(_) => CREATE_TRANSACTION,
            Message::RequestBlock(_) => REQUEST_BLOCK,
            Message::SendBlock(_) => SEND_BLOCK,
            Message::Handshake(_) => HANDSHAKE,
        }
    }

    pub fn encode(&self) -> Result<String, MessageError> {
        let data = match self {
            Message::NewBlock(block) | Message::SendBlock(block) => serde_json::to_value(block)?,
            Message::CreateTransaction(tx) => serde_json::to_value(tx)?,
            Message::RequestBlock(request) => serde_json::to_value(request)?,
            Message::Handshake(address) => Value::String(address.clone()),
        };
        let envelope = Envelope {
            kind: self.kind(),
            data,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn decode(text: &str) -> Result<Self, MessageError> {
        let Envelope { kind, data } = serde_json::from_str(text)?;
        let message = match kind {
            NEW_BLOCK => Message::NewBlock(serde_json::from_value(data)?),
            CREATE_TRANSACTION => Message::CreateTransaction(serde_json::from_value(data)?),
            REQUEST_BLOCK => Message::RequestBlock(serde_json::from_value(data)?),
            SEND_BLOCK => Message::SendBlock(serde_json::from_value(data)?),
            HANDSHAKE => Message::Handshake(serde_json::from_value(data)?),
            other => return Err(MessageError::UnknownType(other)),
        };
        Ok(message)
    }
}
