//! Artifact data model: what the store keeps on disk and what callers see.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which side of the pipeline an artifact sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Caller-submitted document awaiting (or consumed by) a run.
    Input,
    /// Verified pipeline output, ready for retrieval.
    Output,
}

impl ArtifactKind {
    /// On-disk directory the kind lives under.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Input => "uploads",
            Self::Output => "processed",
        }
    }
}

/// One stored document. Write-once: only the store creates artifact files
/// and nothing mutates them afterwards.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub namespace: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
}

/// Where a submitted document came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSource {
    Upload,
    Url { url: String },
}

/// Sidecar metadata persisted as `<id>.meta` JSON next to an output
/// artifact. Survives restarts; `expires_at` duplicates the mtime-derived
/// deadline so listings stay meaningful after a filesystem copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source: ArtifactSource,
    /// Hex digest of the output bytes.
    pub sha256: String,
    /// Name of the cascade tier that produced the output.
    pub winning_strategy: String,
}

/// One row of a namespace listing. Expired artifacts never appear.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactListing {
    pub id: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
    pub seconds_remaining: u64,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest_hex(bytes: &[u8]) -> String {
    crate::core::ids::hex_encode(&Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_layout_directories() {
        assert_eq!(ArtifactKind::Input.dir_name(), "uploads");
        assert_eq!(ArtifactKind::Output.dir_name(), "processed");
    }

    #[test]
    fn digest_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            digest_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let meta = ArtifactMetadata {
            original_name: "report.pdf".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now(),
            source: ArtifactSource::Url {
                url: "https://example.com/report.pdf".to_string(),
            },
            sha256: digest_hex(b"%PDF-1.4"),
            winning_strategy: "qpdf-decrypt".to_string(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kind\":\"url\""));
        let back: ArtifactMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.original_name, meta.original_name);
        assert_eq!(back.source, meta.source);
    }
}
