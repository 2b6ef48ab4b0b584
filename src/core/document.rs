//! Document validity rules.
//!
//! A document is an opaque byte sequence; the core never parses PDF
//! structure. Validity is defined solely by a non-zero length and the
//! 4-byte `%PDF` magic at offset 0.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::core::errors::{PduError, Result};

/// The 4-byte magic header every accepted document must start with.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Whether a byte slice is an acceptable document.
#[must_use]
pub fn is_valid_pdf(bytes: &[u8]) -> bool {
    bytes.len() >= PDF_MAGIC.len() && &bytes[..PDF_MAGIC.len()] == PDF_MAGIC
}

/// Validate a byte slice, producing the typed rejection used before staging.
pub fn validate_bytes(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(PduError::InvalidDocument {
            details: "empty body".to_string(),
        });
    }
    if !is_valid_pdf(bytes) {
        return Err(PduError::InvalidDocument {
            details: "missing %PDF magic header".to_string(),
        });
    }
    Ok(())
}

/// Check a file on disk without reading the whole body.
///
/// Used by strategies to verify their own output: a tool exiting 0 but
/// leaving an empty or malformed file is a failure, not a success.
pub fn file_has_pdf_header(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut header = [0u8; 4];
    matches!(file.read_exact(&mut header), Ok(())) && &header == PDF_MAGIC
}
