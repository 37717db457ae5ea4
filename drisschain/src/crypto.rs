// Copyright (c) 2024 The Drisschain Developers

//! SHA-256 helpers and address derivation.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// SHA-256 of the empty string: "no contract code" and "no storage".
pub const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Raw SHA-256 digest.
pub fn sha256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(data.as_ref()).into()
}

/// Account address for an uncompressed public key given as lowercase hex.
///
/// The digest is taken over the hex text, not the key bytes.
pub fn address_from_public_key(public_key_hex: &str) -> String {
    sha256_hex(public_key_hex)
}

/// True for a 64-character lowercase hex digest.
pub fn is_digest_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Compare two hex strings by numeric value.
pub fn cmp_hex_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len()
        .cmp(&b.len())
        .then_with(|| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash_constant() {
        assert_eq!(sha256_hex(""), EMPTY_HASH);
    }

    #[test]
    fn test_address_hashes_hex_text() {
        let public_key = "04abcdef";
        assert_eq!(address_from_public_key(public_key), sha256_hex("04abcdef"));
        assert_ne!(
            address_from_public_key(public_key),
            sha256_hex(hex::decode(public_key).unwrap())
        );
    }

    #[test]
    fn test_is_digest_hex() {
        assert!(is_digest_hex(EMPTY_HASH));
        assert!(!is_digest_hex(&EMPTY_HASH.to_uppercase()));
        assert!(!is_digest_hex("abc"));
        assert!(!is_digest_hex(&"g".repeat(64)));
    }

    #[test]
    fn test_numeric_hex_ordering() {
        assert_eq!(cmp_hex_numeric("0f", "a"), Ordering::Greater);
        assert_eq!(cmp_hex_numeric("00ff", "ff"), Ordering::Equal);
        assert_eq!(cmp_hex_numeric("10", "f"), Ordering::Greater);
        assert_eq!(cmp_hex_numeric("1", "2"), Ordering::Less);
    }
}
