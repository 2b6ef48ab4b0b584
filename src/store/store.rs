//! Filesystem artifact store: namespace-scoped, TTL-bounded, write-once.
//!
//! Layout under the configured data root:
//!
//! ```text
//! <data_dir>/uploads/<namespace>/<artifact_id>.pdf
//! <data_dir>/processed/<namespace>/<artifact_id>.pdf
//! <data_dir>/processed/<namespace>/<artifact_id>.meta
//! ```
//!
//! Every caller-supplied namespace and artifact id is validated against the
//! fixed-width lowercase-hex charset before any path is built. A string
//! containing `..`, separators, or the wrong length is rejected with zero
//! filesystem access.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeDelta, Utc};

use crate::core::config::StoreConfig;
use crate::core::document;
use crate::core::errors::{PduError, Result};
use crate::core::ids;
use crate::store::artifact::{Artifact, ArtifactKind, ArtifactListing, ArtifactMetadata};

/// How many times id generation retries on a filesystem collision before
/// giving up. With 64 random bits per id this is unreachable in practice.
const ID_COLLISION_RETRIES: u32 = 16;

/// The store. Cheap to construct; all state lives on disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    data_dir: PathBuf,
    ttl: Duration,
}

impl ArtifactStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.data_dir.join(kind.dir_name())
    }

    /// Validated artifact path. The single chokepoint between
    /// caller-supplied identifiers and the filesystem.
    fn artifact_path(&self, namespace: &str, id: &str, kind: ArtifactKind) -> Result<PathBuf> {
        ids::validate_namespace(namespace)?;
        ids::validate_artifact_id(id)?;
        Ok(self
            .kind_dir(kind)
            .join(namespace)
            .join(format!("{id}.pdf")))
    }

    fn metadata_path(artifact_path: &Path) -> PathBuf {
        artifact_path.with_extension("meta")
    }

    /// Stage caller-submitted bytes as a new input artifact.
    ///
    /// The document is validated before anything touches disk; an invalid
    /// body leaves no artifact behind. The generated id is collision-checked
    /// against both trees so an input and output never share an id by
    /// accident.
    pub fn stage(&self, namespace: &str, bytes: &[u8]) -> Result<Artifact> {
        ids::validate_namespace(namespace)?;
        document::validate_bytes(bytes)?;

        let dir = self.kind_dir(ArtifactKind::Input).join(namespace);
        fs::create_dir_all(&dir).map_err(|e| PduError::io(&dir, e))?;

        let (id, path) = self.reserve_id(namespace)?;
        fs::write(&path, bytes).map_err(|e| PduError::io(&path, e))?;

        Ok(Artifact {
            id,
            namespace: namespace.to_string(),
            kind: ArtifactKind::Input,
            created_at: Utc::now(),
            path,
        })
    }

    fn reserve_id(&self, namespace: &str) -> Result<(String, PathBuf)> {
        self.reserve_id_with(namespace, ids::generate_artifact_id)
    }

    /// Exhaustion is an internal store failure, not a caller error: the
    /// caller supplied no identifier of its own.
    fn reserve_id_with(
        &self,
        namespace: &str,
        mut generate: impl FnMut() -> String,
    ) -> Result<(String, PathBuf)> {
        for _ in 0..ID_COLLISION_RETRIES {
            let id = generate();
            let input = self.artifact_path(namespace, &id, ArtifactKind::Input)?;
            let output = self.artifact_path(namespace, &id, ArtifactKind::Output)?;
            if !input.exists() && !output.exists() {
                return Ok((id, input));
            }
        }
        Err(PduError::io(
            self.kind_dir(ArtifactKind::Input).join(namespace),
            std::io::Error::other("artifact id space exhausted"),
        ))
    }

    /// Read an artifact's bytes. Full copy-on-read: the returned buffer is
    /// independent of the file, so a concurrent eviction cannot corrupt an
    /// in-flight read.
    ///
    /// An artifact past its TTL is removed on the spot and reported `Gone`.
    pub fn fetch(&self, namespace: &str, id: &str, kind: ArtifactKind) -> Result<Vec<u8>> {
        let path = self.artifact_path(namespace, id, kind)?;
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PduError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(PduError::io(&path, e)),
        };

        if is_expired(&meta, self.ttl, SystemTime::now()) {
            let _ = fs::remove_file(&path);
            let _ = fs::remove_file(Self::metadata_path(&path));
            return Err(PduError::Gone { id: id.to_string() });
        }

        fs::read(&path).map_err(|e| PduError::io(&path, e))
    }

    /// Destination path for a pipeline run's output artifact. The namespace
    /// directory is created so the winning strategy can write directly.
    pub fn output_path(&self, namespace: &str, id: &str) -> Result<PathBuf> {
        let path = self.artifact_path(namespace, id, ArtifactKind::Output)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PduError::io(parent, e))?;
        }
        Ok(path)
    }

    /// Persist output metadata next to the artifact. Atomic: written to a
    /// temp file and renamed into place, so a reader never sees a torn
    /// `.meta`.
    pub fn record_output(
        &self,
        namespace: &str,
        id: &str,
        metadata: &ArtifactMetadata,
    ) -> Result<()> {
        let artifact = self.artifact_path(namespace, id, ArtifactKind::Output)?;
        let meta_path = Self::metadata_path(&artifact);
        let tmp_path = meta_path.with_extension("meta.tmp");

        let json = serde_json::to_vec_pretty(metadata)?;
        fs::write(&tmp_path, &json).map_err(|e| PduError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &meta_path).map_err(|e| PduError::io(&meta_path, e))?;
        Ok(())
    }

    /// Read the metadata sidecar of an output artifact.
    pub fn read_metadata(&self, namespace: &str, id: &str) -> Result<ArtifactMetadata> {
        let artifact = self.artifact_path(namespace, id, ArtifactKind::Output)?;
        let meta_path = Self::metadata_path(&artifact);
        let json = match fs::read(&meta_path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PduError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(PduError::io(&meta_path, e)),
        };
        Ok(serde_json::from_slice(&json)?)
    }

    /// List the live output artifacts of a namespace, newest first.
    /// Expired entries are excluded (but left for the janitor to remove).
    pub fn list(&self, namespace: &str) -> Result<Vec<ArtifactListing>> {
        ids::validate_namespace(namespace)?;
        let dir = self.kind_dir(ArtifactKind::Output).join(namespace);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // A namespace with no outputs yet has no directory.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PduError::io(&dir, e)),
        };

        let now_sys = SystemTime::now();
        let now = Utc::now();
        let mut listings = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "pdf") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if is_expired(&meta, self.ttl, now_sys) {
                continue;
            }

            let (name, expires_at) = match self.read_metadata(namespace, id) {
                Ok(sidecar) => (sidecar.original_name, sidecar.expires_at),
                // Sidecar missing or torn: fall back to mtime arithmetic.
                Err(_) => (format!("{id}.pdf"), expiry_from_mtime(&meta, self.ttl)),
            };
            let seconds_remaining = expires_at
                .signed_duration_since(now)
                .num_seconds()
                .max(0)
                .unsigned_abs();

            listings.push(ArtifactListing {
                id: id.to_string(),
                name,
                expires_at,
                seconds_remaining,
            });
        }

        listings.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
        Ok(listings)
    }

    /// Drop an input artifact the pipeline no longer needs. Removing an
    /// already-gone input is not an error.
    pub fn discard_input(&self, namespace: &str, id: &str) -> Result<()> {
        let path = self.artifact_path(namespace, id, ArtifactKind::Input)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PduError::io(&path, e)),
        }
    }
}

/// TTL rule: an artifact expires `ttl` after its file mtime.
pub(crate) fn is_expired(meta: &fs::Metadata, ttl: Duration, now: SystemTime) -> bool {
    match meta.modified() {
        Ok(mtime) => mtime + ttl <= now,
        // Unknown mtime: treat as live; the janitor will log and skip it.
        Err(_) => false,
    }
}

fn expiry_from_mtime(meta: &fs::Metadata, ttl: Duration) -> DateTime<Utc> {
    let mtime: DateTime<Utc> = meta.modified().map_or_else(|_| Utc::now(), Into::into);
    mtime + TimeDelta::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}
