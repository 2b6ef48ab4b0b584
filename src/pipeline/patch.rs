//! In-process dictionary-level patch tiers.
//!
//! These tiers rewrite the raw byte stream with structural pattern matching,
//! not an object-graph parse. They assume the encryption dictionary is
//! represented in textual, uncompressed form reachable by pattern matching,
//! which is not guaranteed for all producers; that is a documented
//! limitation of this tier family, not a hidden one. All in-place rewrites
//! are strictly length-preserving so classic cross-reference byte offsets
//! stay valid.
//!
//! Documents using cross-reference streams are outside this family's
//! capability boundary: a compressed xref cannot be kept consistent by byte
//! patching, so the tiers refuse such inputs unless explicitly configured
//! otherwise.

use std::fs;
use std::path::Path;

use memchr::memmem;
use regex::bytes::Regex;

use crate::pipeline::strategy::{StrategyContext, UnlockOutcome, UnlockStrategy, verify_output};

const EOF_MARKER: &[u8] = b"%%EOF";

/// Synthetic unrestricted-permissions object appended by the restriction
/// tier. A high object number keeps it clear of real objects; renderers
/// that honor the last-declared object pick it up.
const SYNTHETIC_PERMS_OBJECT: &[u8] = b"\n999990 0 obj\n<< /Type /Perms /P -4 >>\nendobj\n";

/// Compiled byte patterns shared by the patch tiers.
struct PatchRules {
    /// Trailer reference to the encryption dictionary: `/Encrypt 12 0 R`.
    encrypt_ref: Regex,
    /// Permission bitmask entry: `/P -3904`.
    perm_entry: Regex,
    /// Standard security handler selector: `/Filter /Standard`.
    std_handler: Regex,
    /// Owner/user password entries as hex strings: `/O <A1B2..>`.
    password_hex: Regex,
    /// Owner/user password entries as literal strings: `/U (....)`.
    password_literal: Regex,
    /// Metadata encryption hint: `/EncryptMetadata true`.
    encrypt_metadata: Regex,
    /// Catalog permission hint reference: `/Perms 9 0 R`.
    perms_ref: Regex,
    /// Cross-reference stream marker: `/Type /XRef`.
    xref_stream: Regex,
}

impl PatchRules {
    fn new() -> Result<Self, regex::Error> {
        let rx = Regex::new;
        Ok(Self {
            encrypt_ref: rx(r"(?-u)/Encrypt\s+\d+\s+\d+\s+R")?,
            perm_entry: rx(r"(?-u)/P\s+-?\d+")?,
            std_handler: rx(r"(?-u)/Filter\s*/Standard")?,
            password_hex: rx(r"(?-u)/[OU]\s*<[0-9A-Fa-f\s]*>")?,
            password_literal: rx(r"(?-u)/[OU]\s*\([^()\\]*\)")?,
            encrypt_metadata: rx(r"(?-u)/EncryptMetadata\s+true")?,
            perms_ref: rx(r"(?-u)/Perms\s+\d+\s+\d+\s+R")?,
            xref_stream: rx(r"(?-u)/Type\s*/XRef")?,
        })
    }

    fn uses_xref_stream(&self, bytes: &[u8]) -> bool {
        self.xref_stream.is_match(bytes)
    }
}

/// Space-fill every match of `pattern`, returning the number of rewrites.
fn blank_matches(bytes: &mut [u8], pattern: &Regex) -> usize {
    let ranges: Vec<_> = pattern.find_iter(bytes).map(|m| m.range()).collect();
    for range in &ranges {
        bytes[range.clone()].fill(b' ');
    }
    ranges.len()
}

/// Rewrite every `/P <bitmask>` entry to the allow-all value `-4`,
/// space-padded to the original entry length.
fn rewrite_permission_entries(bytes: &mut [u8], pattern: &Regex) -> usize {
    const ALLOW_ALL: &[u8] = b"/P -4";
    let ranges: Vec<_> = pattern.find_iter(bytes).map(|m| m.range()).collect();
    let mut rewritten = 0;
    for range in ranges {
        if range.len() < ALLOW_ALL.len() {
            // `/P 0` style entries are too narrow for an in-place rewrite;
            // leave them rather than corrupt the token.
            continue;
        }
        let slot = &mut bytes[range];
        slot.fill(b' ');
        slot[..ALLOW_ALL.len()].copy_from_slice(ALLOW_ALL);
        rewritten += 1;
    }
    rewritten
}

/// Append the synthetic permissions object after the final `%%EOF`.
/// Appending never moves existing bytes, so xref offsets are untouched.
fn append_synthetic_perms(bytes: &mut Vec<u8>) -> bool {
    if memmem::rfind(bytes, EOF_MARKER).is_none() {
        return false;
    }
    bytes.extend_from_slice(SYNTHETIC_PERMS_OBJECT);
    bytes.extend_from_slice(EOF_MARKER);
    bytes.push(b'\n');
    true
}

/// Shared attempt shape for the patch tiers.
fn attempt_patch(
    name: &'static str,
    input: &Path,
    output: &Path,
    cx: &StrategyContext<'_>,
    apply: impl FnOnce(&PatchRules, &mut Vec<u8>) -> usize,
) -> UnlockOutcome {
    let mut bytes = match fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => return UnlockOutcome::failure(name, format!("read failed: {e}")),
    };

    let rules = match PatchRules::new() {
        Ok(rules) => rules,
        Err(e) => return UnlockOutcome::failure(name, format!("pattern compile failed: {e}")),
    };
    if rules.uses_xref_stream(&bytes) && !cx.config.allow_patch_on_xref_streams {
        return UnlockOutcome::failure(
            name,
            "cross-reference stream detected; byte-level patching disabled for this input",
        );
    }

    let rewrites = apply(&rules, &mut bytes);
    if rewrites == 0 {
        return UnlockOutcome::failure(name, "no encryption markers found to patch");
    }

    if let Err(e) = fs::write(output, &bytes) {
        return UnlockOutcome::failure(name, format!("write failed: {e}"));
    }
    if let Some(reason) = verify_output(output) {
        return UnlockOutcome::failure(name, reason);
    }
    UnlockOutcome::success(name, format!("{rewrites} marker(s) patched"))
}

/// Tier 6: broad dictionary-level patch.
///
/// Neutralizes the trailer's encryption dictionary reference, rewrites the
/// permission bitmask, blanks the standard-handler selector, and blanks
/// owner/user password entries. Best-effort by design.
#[derive(Debug, Default)]
pub struct DictionaryPatch;

impl UnlockStrategy for DictionaryPatch {
    fn name(&self) -> &'static str {
        "dict-patch"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        attempt_patch(self.name(), input, output, cx, |rules, bytes| {
            blank_matches(bytes, &rules.encrypt_ref)
                + rewrite_permission_entries(bytes, &rules.perm_entry)
                + blank_matches(bytes, &rules.std_handler)
                + blank_matches(bytes, &rules.password_hex)
                + blank_matches(bytes, &rules.password_literal)
        })
    }
}

/// Tier 7: narrower variant targeting only metadata and catalog permission
/// hints (`/EncryptMetadata`, `/Perms`). Blanking `/EncryptMetadata true`
/// removes the explicit hint; it cannot express `false`, which is an
/// accepted limit of length-preserving rewriting.
#[derive(Debug, Default)]
pub struct MetadataPatch;

impl UnlockStrategy for MetadataPatch {
    fn name(&self) -> &'static str {
        "metadata-patch"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        attempt_patch(self.name(), input, output, cx, |rules, bytes| {
            blank_matches(bytes, &rules.encrypt_metadata) + blank_matches(bytes, &rules.perms_ref)
        })
    }
}

/// Tier 8: narrowest variant: permission bitmask and standard-handler keys
/// only, plus a synthetic unrestricted-permissions object appended near the
/// end-of-file marker.
#[derive(Debug, Default)]
pub struct RestrictionPatch;

impl UnlockStrategy for RestrictionPatch {
    fn name(&self) -> &'static str {
        "restriction-patch"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        attempt_patch(self.name(), input, output, cx, |rules, bytes| {
            let mut rewrites = rewrite_permission_entries(bytes, &rules.perm_entry)
                + blank_matches(bytes, &rules.std_handler);
            if rewrites > 0 && append_synthetic_perms(bytes) {
                rewrites += 1;
            }
            rewrites
        })
    }
}
