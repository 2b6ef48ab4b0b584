#![allow(missing_docs)]

//! End-to-end TTL behavior with backdated file mtimes: reads just inside
//! the deadline succeed, reads past it are gone, and the sweep physically
//! removes what the deadline has passed.

use std::time::{Duration, SystemTime};

use pdf_unlock::core::config::StoreConfig;
use pdf_unlock::core::ids;
use pdf_unlock::store::{ArtifactKind, ArtifactStore};

const PDF: &[u8] = b"%PDF-1.4\nttl fixture\n%%EOF\n";
const TTL_SECS: u64 = 600;

fn store_in(dir: &std::path::Path) -> ArtifactStore {
    ArtifactStore::new(&StoreConfig {
        data_dir: dir.to_path_buf(),
        ttl_secs: TTL_SECS,
        ..StoreConfig::default()
    })
}

fn backdate(path: &std::path::Path, age_secs: u64) {
    let t = filetime::FileTime::from_system_time(
        SystemTime::now() - Duration::from_secs(age_secs),
    );
    filetime::set_file_mtime(path, t).unwrap();
}

#[test]
fn fetch_honors_the_ttl_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let ns = ids::generate_namespace();
    let artifact = store.stage(&ns, PDF).unwrap();

    backdate(&artifact.path, TTL_SECS - 1);
    assert_eq!(
        store.fetch(&ns, &artifact.id, ArtifactKind::Input).unwrap(),
        PDF,
        "599 seconds old is still live"
    );

    backdate(&artifact.path, TTL_SECS + 1);
    let err = store.fetch(&ns, &artifact.id, ArtifactKind::Input).unwrap_err();
    assert_eq!(err.code(), "PDU-3002", "601 seconds old is gone");

    // Lazy expiry removed the file; a second read is NotFound.
    let err = store.fetch(&ns, &artifact.id, ArtifactKind::Input).unwrap_err();
    assert_eq!(err.code(), "PDU-3001");
}

#[test]
fn sweep_removes_exactly_the_expired() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let ns = ids::generate_namespace();

    let live = store.stage(&ns, PDF).unwrap();
    let dead = store.stage(&ns, PDF).unwrap();
    backdate(&live.path, TTL_SECS - 1);
    backdate(&dead.path, TTL_SECS + 1);

    let report = store.sweep();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.evicted, 1);
    assert!(live.path.exists());
    assert!(!dead.path.exists());
}

#[test]
fn expiry_is_per_artifact_not_per_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let ns_a = ids::generate_namespace();
    let ns_b = ids::generate_namespace();

    let stale = store.stage(&ns_a, PDF).unwrap();
    let fresh = store.stage(&ns_b, PDF).unwrap();
    backdate(&stale.path, TTL_SECS * 2);

    store.sweep();
    assert!(!stale.path.exists());
    assert!(fresh.path.exists());
    // The emptied namespace directory is pruned, the live one is kept.
    assert!(!dir.path().join("uploads").join(&ns_a).exists());
    assert!(dir.path().join("uploads").join(&ns_b).exists());
}

#[test]
fn listings_and_sweeps_agree_on_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let ns = ids::generate_namespace();
    let id = ids::generate_artifact_id();

    let out = store.output_path(&ns, &id).unwrap();
    std::fs::write(&out, PDF).unwrap();
    backdate(&out, TTL_SECS + 30);

    // The listing already excludes it; the sweep then removes it.
    assert!(store.list(&ns).unwrap().is_empty());
    assert_eq!(store.sweep().evicted, 1);
    assert!(!out.exists());
}
