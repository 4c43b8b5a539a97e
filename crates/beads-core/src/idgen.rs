//! SHA-256 + base36 ID generation.
//!
//! Issue ids have the form `<prefix>-<base36-hash>`. The hash length adapts
//! to the current database size so small repos get short, readable ids while
//! large repos keep collisions improbable. Child ids use the dotted form
//! `<parent>.<suffix>`.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use num_traits::Zero;
use sha2::{Digest, Sha256};

/// Base36 alphabet (0-9, a-z).
const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Default adaptive ID configuration constants.
pub mod adaptive_defaults {
    /// Default collision probability threshold (25%).
    pub const MAX_COLLISION_PROB: f64 = 0.25;
    /// Default minimum hash length.
    pub const MIN_LENGTH: usize = 3;
    /// Default maximum hash length.
    pub const MAX_LENGTH: usize = 8;
}

/// Converts a byte slice to a base36 string of exactly `length` chars.
pub fn encode_base36(data: &[u8], length: usize) -> String {
    let mut num = BigUint::from_bytes_be(data);
    let base = BigUint::from(36u32);
    let zero = BigUint::zero();

    let mut chars: Vec<u8> = Vec::with_capacity(length);
    while num > zero {
        let rem = &num % &base;
        num /= &base;
        let digits = rem.to_u32_digits();
        let i = digits.first().copied().unwrap_or(0) as usize;
        chars.push(BASE36_ALPHABET[i]);
    }
    chars.reverse();

    let mut s = String::from_utf8(chars).expect("base36 chars are valid UTF-8");
    if s.len() < length {
        s = "0".repeat(length - s.len()) + &s;
    }
    if s.len() > length {
        // Keep the least significant digits.
        s = s[s.len() - length..].to_owned();
    }
    s
}

/// How many hash bytes feed a base36 id of the given length.
fn hash_bytes_for(length: usize) -> usize {
    match length {
        3 => 2,
        4 => 3,
        5 | 6 => 4,
        7 | 8 => 5,
        _ => 2,
    }
}

/// Creates a hash-based ID for an issue.
///
/// The hash covers title, description, creator, creation instant and a nonce
/// so that collision retries only bump the nonce.
pub fn generate_hash_id(
    prefix: &str,
    title: &str,
    description: &str,
    creator: &str,
    timestamp: DateTime<Utc>,
    length: usize,
    nonce: i32,
) -> String {
    let content = format!(
        "{}|{}|{}|{}|{}",
        title,
        description,
        creator,
        timestamp.timestamp_nanos_opt().unwrap_or(0),
        nonce
    );
    let hash = Sha256::digest(content.as_bytes());
    let short = encode_base36(&hash[..hash_bytes_for(length)], length);
    format!("{prefix}-{short}")
}

/// Builds the dotted child-id form `<parent>.<suffix>`.
pub fn child_id(parent: &str, suffix: &str) -> String {
    format!("{parent}.{suffix}")
}

/// Determines the smallest ID length that keeps the birthday-paradox
/// collision probability at or below `max_collision_prob` for `num_issues`.
///
/// P(collision) ~ 1 - e^(-n^2 / 2N), N = 36^length.
pub fn compute_adaptive_length(
    num_issues: usize,
    min_length: usize,
    max_length: usize,
    max_collision_prob: f64,
) -> usize {
    for length in min_length..=max_length {
        let total: f64 = 36.0_f64.powi(length as i32);
        let prob = 1.0 - (-(num_issues as f64).powi(2) / (2.0 * total)).exp();
        if prob <= max_collision_prob {
            return length;
        }
    }
    max_length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_base36_empty_is_zeros() {
        assert_eq!(encode_base36(&[], 4), "0000");
    }

    #[test]
    fn encode_base36_exact_length() {
        assert_eq!(encode_base36(&[0xFF, 0xFF], 4).len(), 4);
        assert_eq!(encode_base36(&[0xFF, 0xFF, 0xFF, 0xFF], 3).len(), 3);
    }

    #[test]
    fn generate_hash_id_format() {
        let ts = Utc::now();
        let id = generate_hash_id("bd", "Test Title", "desc", "mayor", ts, 6, 0);
        assert!(id.starts_with("bd-"));
        assert_eq!(id.len(), "bd-".len() + 6);
    }

    #[test]
    fn generate_hash_id_deterministic() {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id1 = generate_hash_id("bd", "Title", "Desc", "mayor", ts, 6, 0);
        let id2 = generate_hash_id("bd", "Title", "Desc", "mayor", ts, 6, 0);
        assert_eq!(id1, id2);
    }

    #[test]
    fn nonce_changes_output() {
        let ts = Utc::now();
        let id1 = generate_hash_id("bd", "Title", "Desc", "mayor", ts, 6, 0);
        let id2 = generate_hash_id("bd", "Title", "Desc", "mayor", ts, 6, 1);
        assert_ne!(id1, id2);
    }

    #[test]
    fn child_id_form() {
        assert_eq!(child_id("bd-a1b", "2"), "bd-a1b.2");
    }

    #[test]
    fn adaptive_length_scaling() {
        assert_eq!(compute_adaptive_length(10, 3, 8, 0.25), 3);
        assert!(compute_adaptive_length(100_000, 3, 8, 0.25) >= 6);
        assert_eq!(compute_adaptive_length(10_000_000, 3, 8, 0.01), 8);
    }
}
