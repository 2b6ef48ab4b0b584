//! Opaque identifier generation and strict validation.
//!
//! Namespace tokens and artifact ids are fixed-width lowercase hex. Every
//! caller-supplied identifier is validated against that charset *before* it
//! is used to build a filesystem path; anything else is rejected with
//! `InvalidIdentifier` and no I/O happens. This is the store's core security
//! invariant and must hold even if namespace resolution changes.

use rand::RngCore;

use crate::core::errors::{PduError, Result};

/// Artifact id width in hex characters (8 random bytes).
pub const ARTIFACT_ID_LEN: usize = 16;

/// Namespace token width in hex characters (16 random bytes).
pub const NAMESPACE_LEN: usize = 32;

/// Generate a fresh artifact id: 16 lowercase hex chars.
#[must_use]
pub fn generate_artifact_id() -> String {
    let mut bytes = [0u8; ARTIFACT_ID_LEN / 2];
    rand::rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Generate a fresh namespace token: 32 lowercase hex chars.
#[must_use]
pub fn generate_namespace() -> String {
    let mut bytes = [0u8; NAMESPACE_LEN / 2];
    rand::rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Validate a caller-supplied artifact id. No filesystem access.
pub fn validate_artifact_id(id: &str) -> Result<()> {
    validate_fixed_hex(id, ARTIFACT_ID_LEN, "artifact id")
}

/// Validate a caller-supplied namespace token. No filesystem access.
pub fn validate_namespace(ns: &str) -> Result<()> {
    validate_fixed_hex(ns, NAMESPACE_LEN, "namespace")
}

fn validate_fixed_hex(value: &str, expected_len: usize, what: &str) -> Result<()> {
    if value.len() != expected_len {
        return Err(PduError::InvalidIdentifier {
            details: format!(
                "{what} must be exactly {expected_len} hex characters, got {}",
                value.len()
            ),
        });
    }
    // Charset check subsumes path-separator and parent-dir rejection: '.',
    // '/', and '\' are not in [0-9a-f].
    if !value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(PduError::InvalidIdentifier {
            details: format!("{what} contains characters outside [0-9a-f]"),
        });
    }
    Ok(())
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_artifact_ids_validate() {
        for _ in 0..32 {
            let id = generate_artifact_id();
            assert_eq!(id.len(), ARTIFACT_ID_LEN);
            validate_artifact_id(&id).expect("generated id must validate");
        }
    }

    #[test]
    fn generated_namespaces_validate() {
        for _ in 0..32 {
            let ns = generate_namespace();
            assert_eq!(ns.len(), NAMESPACE_LEN);
            validate_namespace(&ns).expect("generated namespace must validate");
        }
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = generate_artifact_id();
        let b = generate_artifact_id();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_traversal_sequences() {
        for bad in [
            "../../../../etc/passwd",
            "..0123456789abcd",
            "0123456789abcd/x",
            "0123456789abcd\\x",
            "................",
        ] {
            let err = validate_artifact_id(bad).expect_err("traversal must be rejected");
            assert_eq!(err.code(), "PDU-2002", "input {bad:?}");
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(validate_artifact_id("abc123").is_err());
        assert!(validate_artifact_id(&"a".repeat(ARTIFACT_ID_LEN + 1)).is_err());
        assert!(validate_namespace(&"a".repeat(NAMESPACE_LEN - 1)).is_err());
        assert!(validate_artifact_id("").is_err());
    }

    #[test]
    fn rejects_uppercase_hex() {
        // Tokens are minted lowercase; accepting mixed case would create
        // aliased paths on case-insensitive filesystems.
        assert!(validate_artifact_id("0123456789ABCDEF").is_err());
    }

    #[test]
    fn rejects_non_hex_at_correct_length() {
        assert!(validate_artifact_id("0123456789abcdeg").is_err());
        assert!(validate_artifact_id("0123456789abcde ").is_err());
        assert!(validate_artifact_id("0123456789abcde\u{0}").is_err());
    }

    #[test]
    fn accepts_canonical_ids() {
        validate_artifact_id("0123456789abcdef").unwrap();
        validate_namespace("0123456789abcdef0123456789abcdef").unwrap();
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn no_separator_ever_validates(s in ".*") {
                if s.contains("..") || s.contains('/') || s.contains('\\') {
                    prop_assert!(validate_artifact_id(&s).is_err());
                    prop_assert!(validate_namespace(&s).is_err());
                }
            }

            #[test]
            fn exactly_fixed_width_lowercase_hex_validates(s in "[0-9a-f]{16}") {
                prop_assert!(validate_artifact_id(&s).is_ok());
            }

            #[test]
            fn wrong_width_never_validates(s in "[0-9a-f]{0,15}|[0-9a-f]{17,40}") {
                prop_assert!(validate_artifact_id(&s).is_err());
            }
        }
    }
}
