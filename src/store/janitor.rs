//! TTL eviction sweep.
//!
//! The sweep walks both artifact trees from snapshot listings (collected
//! `Vec`s, never live directory iteration) and removes strictly-expired
//! files. Eligibility is judged against the per-namespace scan timestamp:
//! an artifact created after the sweep began scanning its namespace is
//! never evicted by that sweep. Individual file failures are counted and
//! skipped; the sweep itself never fails.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::store::artifact::ArtifactKind;
use crate::store::store::{ArtifactStore, is_expired};

/// Counters from one complete sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Artifacts examined.
    pub scanned: usize,
    /// Artifacts removed (metadata sidecars not counted separately).
    pub evicted: usize,
    /// Artifacts that could not be examined or removed.
    pub skipped: usize,
}

/// One artifact removed by a sweep.
#[derive(Debug, Clone)]
pub struct Eviction {
    pub namespace: String,
    pub artifact: String,
    pub kind: ArtifactKind,
}

impl ArtifactStore {
    /// Evict every strictly-expired artifact, pruning namespace directories
    /// that end up empty.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_with(|_| {})
    }

    /// Sweep, reporting each removed artifact through `on_evict` so the
    /// caller can log individual evictions alongside the counters.
    pub fn sweep_with(&self, mut on_evict: impl FnMut(Eviction)) -> SweepReport {
        let mut report = SweepReport::default();
        for kind in [ArtifactKind::Input, ArtifactKind::Output] {
            self.sweep_tree(kind, &mut report, &mut on_evict);
        }
        report
    }

    fn sweep_tree(
        &self,
        kind: ArtifactKind,
        report: &mut SweepReport,
        on_evict: &mut impl FnMut(Eviction),
    ) {
        for ns_dir in snapshot(&self.kind_dir(kind)) {
            if !ns_dir.is_dir() {
                continue;
            }
            let namespace = ns_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            // Time-of-scan rule: everything in this namespace is judged
            // against one instant, taken before its entries are touched.
            let scan_started = SystemTime::now();
            for path in snapshot(&ns_dir) {
                if path.extension().is_none_or(|ext| ext != "pdf") {
                    continue;
                }
                report.scanned += 1;
                match fs::metadata(&path) {
                    Ok(meta) if is_expired(&meta, self.ttl(), scan_started) => {
                        if fs::remove_file(&path).is_ok() {
                            let _ = fs::remove_file(path.with_extension("meta"));
                            report.evicted += 1;
                            let artifact = path
                                .file_stem()
                                .and_then(|s| s.to_str())
                                .unwrap_or_default()
                                .to_string();
                            on_evict(Eviction {
                                namespace: namespace.clone(),
                                artifact,
                                kind,
                            });
                        } else {
                            report.skipped += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => report.skipped += 1,
                }
            }
            // Prune if empty; racing submits make this fail harmlessly.
            let _ = fs::remove_dir(&ns_dir);
        }
    }
}

/// Collect a directory listing up front. Missing directories are simply
/// empty: a fresh store has no trees yet.
fn snapshot(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|e| e.path()).collect())
        .unwrap_or_default()
}
