// Copyright (c) 2024 The Drisschain Developers

//! Signed account transactions.
//!
//! The sender is never stored: it is recovered from the signature over the
//! transaction hash and hashed into an address.

use dss_crypto_secp256k1::{recover_public_key, RecoverableSignature, Secp256k1Keypair};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ChainParams;
use crate::crypto::{address_from_public_key, is_digest_hex, sha256, sha256_hex};
use crate::ledger::{LedgerError, StateReader};
use crate::numeric::{self, to_hex};

pub use dss_crypto_secp256k1::Error as SignatureError;

/// Reasons a transaction fails weak validation.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("Recipient is not a 64-digit lowercase hex address")]
    MalformedRecipient,

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Sender {0} does not exist")]
    UnknownSender(String),

    #[error("Sender {0} is a contract")]
    ContractSender(String),

    #[error("Insufficient balance: {address} holds {balance}, needs {required}")]
    InsufficientBalance {
        address: String,
        balance: BigUint,
        required: BigUint,
    },

    #[error("Gas {gas} is below the minimum of {minimum}")]
    GasTooLow { gas: BigUint, minimum: BigUint },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Optional payload of a transaction.
///
/// Serialized with keys in the order `contractGas`, `scBody`, `txCallArgs`
/// and absent keys omitted; the transaction hash depends on this form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalData {
    /// Gas budget for contract execution
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "numeric::option_decimal"
    )]
    pub contract_gas: Option<BigUint>,

    /// Contract source to deploy at the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sc_body: Option<String>,

    /// Positional arguments for a contract call
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "numeric::option_hex_list"
    )]
    pub tx_call_args: Option<Vec<BigUint>>,
}

impl AdditionalData {
    /// Canonical JSON text used in the transaction hash.
    pub fn canonical_json(&self) -> String {
        // Canonical order is also alphabetical, so it holds whether or not the
        // map preserves insertion order.
        let mut map = Map::new();
        if let Some(gas) = &self.contract_gas {
            map.insert("contractGas".into(), Value::String(gas.to_str_radix(10)));
        }
        if let Some(body) = &self.sc_body {
            map.insert("scBody".into(), Value::String(body.clone()));
        }
        if let Some(args) = &self.tx_call_args {
            let args = args.iter().map(|arg| Value::String(to_hex(arg))).collect();
            map.insert("txCallArgs".into(), Value::Array(args));
        }
        Value::Object(map).to_string()
    }
}

/// ECDSA recovery components, lowercase hex without padding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub v: String,
    pub r: String,
    pub s: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub recipient: String,
    #[serde(with = "numeric::decimal")]
    pub amount: BigUint,
    #[serde(with = "numeric::decimal")]
    pub gas: BigUint,
    #[serde(default)]
    pub additional_data: AdditionalData,
    pub nonce: u64,
    #[serde(default)]
    pub signature: Signature,
}

impl Transaction {
    /// An unsigned transaction.
    pub fn new(
        recipient: impl Into<String>,
        amount: BigUint,
        gas: BigUint,
        additional_data: AdditionalData,
        nonce: u64,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            amount,
            gas,
            additional_data,
            nonce,
            signature: Signature::default(),
        }
    }

    fn preimage(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.recipient,
            self.amount,
            self.gas,
            self.additional_data.canonical_json(),
            self.nonce
        )
    }

    /// Hex hash over every field except the signature.
    pub fn hash(&self) -> String {
        sha256_hex(self.preimage())
    }

    fn hash_bytes(&self) -> [u8; 32] {
        sha256(self.preimage())
    }

    /// Sign the hash and store the recovery components.
    pub fn sign(&mut self, keypair: &Secp256k1Keypair) -> Result<(), SignatureError> {
        let signature = keypair.sign_hash(&self.hash_bytes())?;
        self.signature = Signature {
            v: signature.v_hex(),
            r: signature.r_hex(),
            s: signature.s_hex(),
        };
        Ok(())
    }

    /// Recover the signer's uncompressed public key as lowercase hex.
    pub fn recover_public_key(&self) -> Result<String, SignatureError> {
        let Signature { v, r, s } = &self.signature;
        let signature = RecoverableSignature::from_hex_parts(v, r, s)?;
        let public_key = recover_public_key(&self.hash_bytes(), &signature)?;
        Ok(hex::encode(public_key))
    }

    /// Address of the signer.
    pub fn sender(&self) -> Result<String, SignatureError> {
        Ok(address_from_public_key(&self.recover_public_key()?))
    }

    /// Declared contract gas, zero when absent.
    pub fn contract_gas(&self) -> BigUint {
        self.additional_data.contract_gas.clone().unwrap_or_default()
    }

    /// `gas + contractGas`, the fee paid to the coinbase.
    pub fn fee(&self) -> BigUint {
        &self.gas + self.contract_gas()
    }

    /// `amount + gas + contractGas`, debited from the sender.
    pub fn total_cost(&self) -> BigUint {
        &self.amount + self.fee()
    }

    /// Canonical JSON of the whole transaction, signature included.
    ///
    /// Matches `serde_json::to_string` of the struct.
    pub fn canonical_json(&self) -> String {
        format!(
            r#"{{"recipient":{},"amount":"{}","gas":"{}","additionalData":{},"nonce":{},"signature":{{"v":{},"r":{},"s":{}}}}}"#,
            Value::from(self.recipient.as_str()),
            self.amount,
            self.gas,
            self.additional_data.canonical_json(),
            self.nonce,
            Value::from(self.signature.v.as_str()),
            Value::from(self.signature.r.as_str()),
            Value::from(self.signature.s.as_str()),
        )
    }

    /// Weak validation against committed state.
    ///
    /// Checks, in order: the recipient is an address, the signature recovers,
    /// the sender exists, the sender is not a contract, the sender can cover
    /// `amount + gas + contractGas`, and `gas` meets the protocol minimum.
    /// Pending transactions of the same sender are not considered.
    ///
    /// Returns the recovered sender address.
    pub fn validate<S: StateReader>(
        &self,
        state: &S,
        params: &ChainParams,
    ) -> Result<String, TxError> {
        // Digit-only amounts and the integer nonce are enforced when the
        // transaction is decoded.
        if !is_digest_hex(&self.recipient) {
            return Err(TxError::MalformedRecipient);
        }

        let sender = self.sender()?;

        let account = state
            .account(&sender)?
            .ok_or_else(|| TxError::UnknownSender(sender.clone()))?;

        if account.is_contract() {
            return Err(TxError::ContractSender(sender));
        }

        let required = self.total_cost();
        if account.balance < required {
            return Err(TxError::InsufficientBalance {
                address: sender,
                balance: account.balance,
                required,
            });
        }

        if self.gas < params.min_tx_gas {
            return Err(TxError::GasTooLow {
                gas: self.gas.clone(),
                minimum: params.min_tx_gas.clone(),
            });
        }

        Ok(sender)
    }
}
