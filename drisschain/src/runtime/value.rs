// Copyright (c) 2024 The Drisschain Developers

//! Value conversions used by the interpreter.
//!
//! Memory and storage hold canonical `0x` hex text. Anything stored is
//! passed through [`normalize`], which maps unparsable or negative values to
//! `0x0`. Values wider than [`MAX_VALUE_BITS`] are also read and stored as
//! `0x0`, so repeated squaring cannot grow a register without bound.

use num_bigint::BigInt;
use num_traits::{One, ToPrimitive, Zero};

use super::program::{BinaryOp, CompareOp};
use crate::numeric::{clamp_non_negative, parse_literal, to_hex};

/// Largest shift, in bits, that `ls`/`rs` will perform.
pub const MAX_SHIFT_BITS: u64 = 4096;

/// Widest value a register or storage slot can hold.
pub const MAX_VALUE_BITS: u64 = 4096;

/// Longest text worth parsing: a `0b` literal of [`MAX_VALUE_BITS`] digits.
const MAX_VALUE_TEXT: usize = 2 + MAX_VALUE_BITS as usize;

pub const ZERO: &str = "0x0";
pub const ONE: &str = "0x1";

/// Numeric reading of a value; unparsable text reads as zero.
pub fn read_int(text: &str) -> BigInt {
    parse_bounded(text).unwrap_or_default()
}

/// Canonical form of a value about to be stored.
pub fn normalize(text: &str) -> String {
    match parse_bounded(text) {
        Some(value) => normalize_int(&value),
        None => ZERO.to_string(),
    }
}

pub fn normalize_int(value: &BigInt) -> String {
    if value.bits() > MAX_VALUE_BITS {
        return ZERO.to_string();
    }
    to_hex(&clamp_non_negative(value))
}

fn parse_bounded(text: &str) -> Option<BigInt> {
    if text.len() > MAX_VALUE_TEXT {
        return None;
    }
    parse_literal(text).filter(|value| value.bits() <= MAX_VALUE_BITS)
}

/// Address text as used for state lookups: no `0x`, left-padded to 64 digits.
pub fn to_address(text: &str) -> String {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
        .to_ascii_lowercase();
    format!("{digits:0>64}")
}

pub fn apply_binary(op: BinaryOp, lhs: &BigInt, rhs: &BigInt) -> BigInt {
    match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div if rhs.is_zero() => BigInt::zero(),
        BinaryOp::Div => lhs / rhs,
        BinaryOp::Mod if rhs.is_zero() => BigInt::zero(),
        BinaryOp::Mod => lhs % rhs,
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Shl => match shift_amount(rhs) {
            Some(bits) => lhs << bits,
            None => BigInt::zero(),
        },
        BinaryOp::Shr => match shift_amount(rhs) {
            Some(bits) => lhs >> bits,
            None => BigInt::zero(),
        },
    }
}

fn shift_amount(rhs: &BigInt) -> Option<usize> {
    rhs.to_u64()
        .filter(|bits| *bits <= MAX_SHIFT_BITS)
        .and_then(|bits| usize::try_from(bits).ok())
}

pub fn apply_compare(op: CompareOp, lhs: &BigInt, rhs: &BigInt) -> &'static str {
    let holds = match op {
        CompareOp::Gtr => lhs > rhs,
        CompareOp::Lss => lhs < rhs,
        CompareOp::Geq => lhs >= rhs,
        CompareOp::Leq => lhs <= rhs,
        CompareOp::Equ => lhs == rhs,
        CompareOp::Neq => lhs != rhs,
    };
    if holds {
        ONE
    } else {
        ZERO
    }
}

/// `!value`, i.e. `-value - 1`.
pub fn complement(value: &BigInt) -> BigInt {
    -value - BigInt::one()
}
