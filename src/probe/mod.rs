//! External tool detection: PATH lookup plus `--version` probing.
//!
//! Absence of a binary is a normal, expected state, never an error. Probe
//! results are cached in a [`ToolInventory`] scoped to a single pipeline
//! run; a fresh inventory is built per run so an operator installing a tool
//! between requests is picked up without a restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use parking_lot::RwLock;
use serde::Serialize;

/// The external document-processing tools the cascade can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalTool {
    Ghostscript,
    Qpdf,
    Pdftk,
}

impl ExternalTool {
    /// Default binary name on PATH.
    #[must_use]
    pub const fn default_binary(self) -> &'static str {
        match self {
            Self::Ghostscript => "gs",
            Self::Qpdf => "qpdf",
            Self::Pdftk => "pdftk",
        }
    }
}

/// Result of probing one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    /// Whether the binary exists on PATH and answered `--version`.
    pub available: bool,
    /// Version string when the tool reported one.
    pub version: Option<String>,
    /// Resolved binary path, for diagnostics.
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    const fn missing() -> Self {
        Self {
            available: false,
            version: None,
            path: None,
        }
    }
}

/// Probe a binary by name. Read-only, side-effect free.
#[must_use]
pub fn probe(binary: &str) -> ToolStatus {
    let Some(path) = which_binary(binary) else {
        return ToolStatus::missing();
    };
    let version = probe_version(binary);
    ToolStatus {
        // A binary that exists but cannot answer --version is treated as
        // unusable; strategies would only produce confusing tool errors.
        available: version.is_some(),
        version,
        path: Some(path),
    }
}

/// Per-run cache of probe results.
///
/// Built once at the start of a pipeline run and passed into strategies;
/// never stored process-wide.
#[derive(Debug, Default)]
pub struct ToolInventory {
    cache: RwLock<HashMap<String, ToolStatus>>,
}

impl ToolInventory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe status for `binary`, cached for the lifetime of this inventory.
    pub fn status(&self, binary: &str) -> ToolStatus {
        {
            let cache = self.cache.read();
            if let Some(status) = cache.get(binary) {
                return status.clone();
            }
        }
        let status = probe(binary);
        self.cache.write().insert(binary.to_string(), status.clone());
        status
    }

    /// Whether `binary` is usable on this host.
    pub fn is_available(&self, binary: &str) -> bool {
        self.status(binary).available
    }
}

fn which_binary(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&paths) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn probe_version(binary: &str) -> Option<String> {
    let output = Command::new(binary).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Extract a version token from the first line (e.g. "qpdf version 11.9.0").
    let first_line = stdout.lines().next()?;
    for token in first_line.split_whitespace() {
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) && token.contains('.') {
            return Some(token.to_string());
        }
    }
    // Fallback: the whole first line trimmed (gs prints a bare number, which
    // the loop above already catches; this covers oddballs).
    Some(first_line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_not_an_error() {
        let status = probe("pdu-test-no-such-binary-5417");
        assert!(!status.available);
        assert!(status.version.is_none());
        assert!(status.path.is_none());
    }

    #[test]
    fn inventory_caches_probe_results() {
        let inv = ToolInventory::new();
        let first = inv.status("pdu-test-no-such-binary-5417");
        let second = inv.status("pdu-test-no-such-binary-5417");
        assert_eq!(first, second);
        assert_eq!(inv.cache.read().len(), 1);
    }

    #[test]
    fn inventory_availability_shorthand() {
        let inv = ToolInventory::new();
        assert!(!inv.is_available("pdu-test-no-such-binary-5417"));
    }

    #[test]
    fn default_binaries_are_stable() {
        assert_eq!(ExternalTool::Ghostscript.default_binary(), "gs");
        assert_eq!(ExternalTool::Qpdf.default_binary(), "qpdf");
        assert_eq!(ExternalTool::Pdftk.default_binary(), "pdftk");
    }

    #[test]
    fn which_binary_finds_shell() {
        // /bin/sh exists on every platform we target.
        #[cfg(unix)]
        assert!(which_binary("sh").is_some());
    }
}
