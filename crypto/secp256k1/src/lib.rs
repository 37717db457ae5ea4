// Copyright (c) 2024 The Drisschain Developers

#![deny(unsafe_code)]

//! Secp256k1 key support for Drisschain transaction signing.
//!
//! Transactions are signed over a 32-byte digest with recoverable ECDSA. The
//! signature travels as three lowercase hex strings (`v`, `r`, `s`) without
//! zero padding, and the signer is identified by recovering the uncompressed
//! public key from those components.
//!
//! # Examples
//!
//! ```
//! use dss_crypto_secp256k1::{recover_public_key, Secp256k1Keypair};
//!
//! let keypair = Secp256k1Keypair::generate(&mut rand::rngs::OsRng);
//! let digest = [7u8; 32];
//!
//! let signature = keypair.sign_hash(&digest).unwrap();
//! let recovered = recover_public_key(&digest, &signature).unwrap();
//! assert_eq!(recovered, keypair.public_key_uncompressed());
//! ```

use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use rand_core::CryptoRngCore;
use zeroize::{Zeroizing, ZeroizeOnDrop};

/// Errors that can occur during key operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Malformed signature component `{component}`: {reason}")]
    MalformedSignature {
        component: &'static str,
        reason: String,
    },

    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Public key recovery failed")]
    RecoveryFailed,
}

/// A secp256k1 keypair used to sign transaction digests.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Secp256k1Keypair {
    #[zeroize(skip)] // SigningKey implements its own zeroization
    signing_key: SigningKey,
}

impl core::fmt::Debug for Secp256k1Keypair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Secp256k1Keypair {{ public_key: {} }}", self.public_key_hex())
    }
}

impl Secp256k1Keypair {
    /// Generate a fresh keypair.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        Self {
            signing_key: SigningKey::random(rng),
        }
    }

    /// Create a keypair from raw 32-byte private key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Create a keypair from a hex-encoded private key.
    ///
    /// Shorter inputs are left-padded, so keys written without leading zeros
    /// still load.
    pub fn from_hex(secret_hex: &str) -> Result<Self, Error> {
        let padded = Zeroizing::new(left_pad(secret_hex.trim(), 64).ok_or(Error::InvalidPrivateKey)?);
        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(padded.as_bytes(), &mut bytes[..])
            .map_err(|_| Error::InvalidPrivateKey)?;
        Self::from_bytes(&bytes)
    }

    /// The private key as 64 lowercase hex characters.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    /// Get the public key as uncompressed bytes (65 bytes: 0x04 || x || y).
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        encode_uncompressed(self.signing_key.verifying_key())
    }

    /// The uncompressed public key as lowercase hex (130 characters).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_uncompressed())
    }

    /// Sign a raw 32-byte digest.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, Error> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| Error::SigningError(e.to_string()))?;

        let (r_bytes, s_bytes) = signature.split_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&r_bytes);
        s.copy_from_slice(&s_bytes);

        Ok(RecoverableSignature {
            recovery_id: recovery_id.to_byte(),
            r,
            s,
        })
    }
}

/// A recoverable ECDSA signature split into its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// Recovery id (0..=3).
    pub recovery_id: u8,
    /// Big-endian `r` scalar.
    pub r: [u8; 32],
    /// Big-endian `s` scalar.
    pub s: [u8; 32],
}

impl RecoverableSignature {
    /// Parse the hex components as they travel on a transaction.
    pub fn from_hex_parts(v: &str, r: &str, s: &str) -> Result<Self, Error> {
        let recovery_id = u8::from_str_radix(v, 16).map_err(|e| Error::MalformedSignature {
            component: "v",
            reason: e.to_string(),
        })?;
        if recovery_id > 3 {
            return Err(Error::MalformedSignature {
                component: "v",
                reason: format!("recovery id {recovery_id} out of range"),
            });
        }

        Ok(Self {
            recovery_id,
            r: decode_scalar("r", r)?,
            s: decode_scalar("s", s)?,
        })
    }

    /// Recovery id as unpadded hex.
    pub fn v_hex(&self) -> String {
        format!("{:x}", self.recovery_id)
    }

    /// `r` as unpadded lowercase hex.
    pub fn r_hex(&self) -> String {
        trim_hex(&self.r)
    }

    /// `s` as unpadded lowercase hex.
    pub fn s_hex(&self) -> String {
        trim_hex(&self.s)
    }
}

/// Recover the uncompressed public key that produced `signature` over `hash`.
pub fn recover_public_key(
    hash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<[u8; 65], Error> {
    let recovery_id = RecoveryId::from_byte(signature.recovery_id).ok_or(Error::RecoveryFailed)?;

    let mut r_s = [0u8; 64];
    r_s[..32].copy_from_slice(&signature.r);
    r_s[32..].copy_from_slice(&signature.s);
    let sig = K256Signature::from_slice(&r_s).map_err(|_| Error::RecoveryFailed)?;

    let verifying_key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
        .map_err(|_| Error::RecoveryFailed)?;

    Ok(encode_uncompressed(&verifying_key))
}

fn encode_uncompressed(key: &VerifyingKey) -> [u8; 65] {
    let point = key.to_encoded_point(false);
    let mut result = [0u8; 65];
    result.copy_from_slice(point.as_bytes());
    result
}

fn decode_scalar(component: &'static str, value: &str) -> Result<[u8; 32], Error> {
    let padded = left_pad(value, 64).ok_or_else(|| Error::MalformedSignature {
        component,
        reason: format!("expected at most 64 hex digits, got {}", value.len()),
    })?;

    let mut out = [0u8; 32];
    hex::decode_to_slice(padded.as_bytes(), &mut out).map_err(|e| Error::MalformedSignature {
        component,
        reason: e.to_string(),
    })?;
    Ok(out)
}

fn left_pad(value: &str, width: usize) -> Option<String> {
    if value.is_empty() || value.len() > width {
        return None;
    }
    Some(format!("{value:0>width$}"))
}

fn trim_hex(bytes: &[u8; 32]) -> String {
    let encoded = hex::encode(bytes);
    let trimmed = encoded.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
