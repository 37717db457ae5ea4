// Copyright (c) 2024 The Drisschain Developers

//! Big-integer parsing and the string encodings used at the store/wire boundary.
//!
//! Balances, amounts and gas travel as digit-only decimal strings. Contract
//! values and call arguments travel as `0x`-prefixed lowercase hex.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

/// Parse a digit-only decimal string. Signs, whitespace and empty input are rejected.
pub fn parse_decimal(value: &str) -> Option<BigUint> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(value.as_bytes(), 10)
}

/// Parse an integer literal the way contract operands are read.
///
/// Accepts `0x`/`0o`/`0b` prefixed unsigned literals and signed decimal.
/// Surrounding whitespace is ignored and blank input reads as zero.
pub fn parse_literal(value: &str) -> Option<BigInt> {
    let value = value.trim();
    if value.is_empty() {
        return Some(BigInt::zero());
    }

    let prefixed = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
    for (prefix, radix) in prefixed {
        if let Some(digits) = value.strip_prefix(prefix) {
            return parse_digits(digits, radix).map(|v| BigInt::from_biguint(Sign::Plus, v));
        }
    }

    let (negative, digits) = match value.as_bytes()[0] {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };
    let magnitude = parse_digits(digits, 10)?;
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Some(BigInt::from_biguint(sign, magnitude))
}

fn parse_digits(digits: &str, radix: u32) -> Option<BigUint> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    BigUint::parse_bytes(digits.as_bytes(), radix)
}

/// `0x`-prefixed lowercase hex; zero is `0x0`.
pub fn to_hex(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

/// Clamp a signed value into the non-negative domain; negatives become zero.
pub fn clamp_non_negative(value: &BigInt) -> BigUint {
    value.to_biguint().unwrap_or_default()
}

/// Serde adapter for a `BigUint` stored as a decimal string.
pub mod decimal {
    use super::parse_decimal;
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_decimal(&raw)
            .ok_or_else(|| D::Error::custom(format!("expected a digit-only decimal string, got {raw:?}")))
    }
}

/// Serde adapter for an optional decimal-string `BigUint`.
pub mod option_decimal {
    use super::parse_decimal;
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<BigUint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_str_radix(10)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigUint>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_decimal(&raw).map(Some).ok_or_else(|| {
                D::Error::custom(format!("expected a digit-only decimal string, got {raw:?}"))
            }),
            None => Ok(None),
        }
    }
}

/// Serde adapter for call arguments: written as `0x` hex strings, read from
/// hex/decimal strings or plain JSON integers.
pub mod option_hex_list {
    use super::{parse_literal, to_hex};
    use num_bigint::BigUint;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawArg {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<BigUint>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(args) => {
                let mut seq = serializer.serialize_seq(Some(args.len()))?;
                for arg in args {
                    seq.serialize_element(&to_hex(arg))?;
                }
                seq.end()
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<BigUint>>, D::Error> {
        let Some(raw) = Option::<Vec<RawArg>>::deserialize(deserializer)? else {
            return Ok(None);
        };

        raw.into_iter()
            .map(|arg| match arg {
                RawArg::Number(n) => Ok(BigUint::from(n)),
                RawArg::Text(text) => parse_literal(&text)
                    .and_then(|v| v.to_biguint())
                    .ok_or_else(|| D::Error::custom(format!("invalid call argument {text:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}
