//! EIP-55 address checksums and address literal normalization.
//!
//! Solidity rejects mixed-case address literals whose checksum is wrong and
//! all-lowercase literals that contain hex letters, so every address that
//! ends up in generated code goes through [`correct_checksum`]. Anything that
//! is not exactly `0x` + 40 hex digits comes back unchanged.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use sha3::{Digest, Keccak256};

use crate::text::cached_regex;

#[must_use]
pub fn is_hex_address(input: &str) -> bool {
    let Some(digits) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) else {
        return false;
    };
    digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// EIP-55 checksum of a 40-digit hex address. Inputs that are not a valid
/// address are returned as-is.
#[must_use]
pub fn correct_checksum(address: &str) -> String {
    if !is_hex_address(address) {
        log::debug!("checksum skipped for non-address literal {address:?}");
        return address.to_string();
    }
    let lower = address[2..].to_ascii_lowercase();
    let hash = hex::encode(Keccak256::digest(lower.as_bytes()));
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (ch, nibble) in lower.chars().zip(hash.chars()) {
        if ch.is_ascii_alphabetic() && nibble >= '8' {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Left-pad a hex value to 40 digits (keeping the low 40 digits of longer
/// values) and prefix `0x`.
#[must_use]
pub fn pad_address(raw: &str) -> String {
    let digits = raw
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let digits = if digits.len() > 40 {
        &digits[digits.len() - 40..]
    } else {
        digits
    };
    format!("0x{digits:0>40}")
}

/// Render any hex value as a checksummed address literal.
#[must_use]
pub fn format_address(raw: &str) -> String {
    correct_checksum(&pad_address(raw))
}

/// Pad and checksum every `0x` literal of at most 40 digits in `input`.
/// Literals longer than 40 digits are left alone.
#[must_use]
pub fn correct_all_checksums(input: &str) -> String {
    static HEX_LITERAL: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = cached_regex(&HEX_LITERAL, r"0x[0-9a-fA-F]+") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures<'_>| {
        let literal = &caps[0];
        if literal.len() - 2 > 40 {
            literal.to_string()
        } else {
            format_address(literal)
        }
    })
    .into_owned()
}

/// Checksum only the literals in `input` that are already full 40-digit
/// addresses; shorter hex numbers are left untouched.
#[must_use]
pub fn checksum_address_literals(input: &str) -> String {
    static HEX_LITERAL: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = cached_regex(&HEX_LITERAL, r"0x[0-9a-fA-F]+") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures<'_>| correct_checksum(&caps[0]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_reference_vectors() {
        assert_eq!(
            correct_checksum("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(
            correct_checksum("0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359"),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
        assert_eq!(
            correct_checksum("0xffffffffffffffffffffffffffffffffffffffff"),
            "0xFFfFfFffFFfffFFfFFfFFFFFffFFFffffFfFFFfF"
        );
    }

    #[test]
    fn checksum_is_idempotent() {
        let once = correct_checksum("0xdbf03b407c01e7cd3cbea99509d93f8dddc8c6fb");
        assert_eq!(correct_checksum(&once), once);
    }

    #[test]
    fn invalid_input_falls_back_to_original() {
        assert_eq!(correct_checksum("0x1234"), "0x1234");
        assert_eq!(correct_checksum("not an address"), "not an address");
        assert_eq!(
            correct_checksum("0xzz00000000000000000000000000000000000000"),
            "0xzz00000000000000000000000000000000000000"
        );
    }

    #[test]
    fn short_hex_is_left_padded() {
        assert_eq!(
            pad_address("0x10000"),
            "0x0000000000000000000000000000000000010000"
        );
        assert_eq!(
            format_address("0x8000000000000000000000000000000000000000"),
            "0x8000000000000000000000000000000000000000"
        );
        let long = format!("0x{}{}", "00".repeat(12), "ab".repeat(20));
        assert_eq!(pad_address(&long), format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn correct_all_checksums_pads_short_literals() {
        assert_eq!(
            correct_all_checksums("prank(0x10000)"),
            "prank(0x0000000000000000000000000000000000010000)"
        );
    }

    #[test]
    fn literal_checksum_leaves_numbers_alone() {
        assert_eq!(
            checksum_address_literals("f(0x05, 0xffffffffffffffffffffffffffffffffffffffff)"),
            "f(0x05, 0xFFfFfFffFFfffFFfFFfFFFFFffFFFffffFfFFFfF)"
        );
    }
}
