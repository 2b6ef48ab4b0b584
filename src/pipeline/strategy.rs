//! The strategy capability: one independently-implemented unlock technique.
//!
//! Each strategy attempts `input -> output` and reports a uniform outcome.
//! Strategies verify their own output (non-zero size, `%PDF` header) before
//! reporting success; the cascade in [`crate::pipeline::runner`] trusts that
//! verdict and stops at the first verified success.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::core::config::PipelineConfig;
use crate::core::document;
use crate::probe::ToolInventory;

/// Result of one strategy attempt. One is recorded per attempt, successful
/// or not; the ordered sequence is the pipeline's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockOutcome {
    /// Stable strategy name (e.g. `"qpdf-decrypt"`, `"copy"`).
    pub strategy: &'static str,
    pub success: bool,
    /// Human-readable diagnostic: tool stderr, skip reason, or "ok".
    pub diagnostic: String,
}

impl UnlockOutcome {
    #[must_use]
    pub fn success(strategy: &'static str, diagnostic: impl Into<String>) -> Self {
        Self {
            strategy,
            success: true,
            diagnostic: diagnostic.into(),
        }
    }

    #[must_use]
    pub fn failure(strategy: &'static str, diagnostic: impl Into<String>) -> Self {
        Self {
            strategy,
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Shared, read-only context for a single pipeline run.
pub struct StrategyContext<'a> {
    /// Per-run tool availability cache. Rebuilt every run so tool
    /// installs/removals between requests are observed.
    pub tools: &'a ToolInventory,
    pub config: &'a PipelineConfig,
}

/// One unlock technique, polymorphic over `attempt`.
///
/// Implementations must be deterministic given identical inputs and host
/// tool versions, and must never panic on malformed documents.
pub trait UnlockStrategy: Send + Sync {
    /// Stable identifier surfaced in outcomes and the audit log.
    fn name(&self) -> &'static str;

    /// Try to produce an unrestricted copy of `input` at `output`.
    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome;
}

/// Post-attempt verification every strategy applies to its own output.
///
/// Returns `None` when the output is acceptable, otherwise the reason it is
/// not. An unacceptable output file is removed so a later tier starts clean.
pub fn verify_output(output: &Path) -> Option<String> {
    let size = match fs::metadata(output) {
        Ok(meta) => meta.len(),
        Err(e) => return Some(format!("output missing: {e}")),
    };
    if size == 0 {
        let _ = fs::remove_file(output);
        return Some("output file is empty".to_string());
    }
    if !document::file_has_pdf_header(output) {
        let _ = fs::remove_file(output);
        return Some("output lacks %PDF header".to_string());
    }
    None
}

/// Tier 9: byte-identical copy of the input.
///
/// Guarantees the cascade always terminates with some output artifact, even
/// on a host with zero tools installed or a file that is already
/// unprotected. No restriction is actually removed; callers must treat a
/// `"copy"` outcome differently from a genuine unlock.
#[derive(Debug, Default)]
pub struct LastResortCopy;

impl UnlockStrategy for LastResortCopy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn attempt(&self, input: &Path, output: &Path, _cx: &StrategyContext<'_>) -> UnlockOutcome {
        if let Err(e) = fs::copy(input, output) {
            return UnlockOutcome::failure(self.name(), format!("copy failed: {e}"));
        }
        if let Some(reason) = verify_output(output) {
            return UnlockOutcome::failure(self.name(), reason);
        }
        UnlockOutcome::success(self.name(), "input copied verbatim; restrictions not removed")
    }
}
