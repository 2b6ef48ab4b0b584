//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PduError, Result};

/// Full configuration model for the unlock service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Artifact store layout and expiry knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding `uploads/` and `processed/` trees.
    pub data_dir: PathBuf,
    /// Artifact time-to-live in seconds.
    pub ttl_secs: u64,
    /// Advisory lifetime of namespace tokens; callers persist the token.
    pub namespace_token_ttl_days: u64,
    /// Run a janitor sweep as part of every submit (the cron-less default).
    pub sweep_on_submit: bool,
}

/// Strategy cascade knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hard timeout for each external-tool invocation, in seconds.
    /// A timed-out strategy is a failure, not a crash.
    pub tool_timeout_secs: u64,
    /// Rendering resolution for the page re-import tier.
    pub reimport_dpi: u32,
    /// Permit the byte-pattern patch tiers on documents that use
    /// cross-reference streams. Off by default: equal-length patching cannot
    /// keep a compressed xref consistent.
    pub allow_patch_on_xref_streams: bool,
    /// External tool binary names, overridable for exotic installs.
    pub gs_binary: String,
    pub qpdf_binary: String,
    pub pdftk_binary: String,
}

/// Remote-URL submit source knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    pub fetch_timeout_secs: u64,
    /// Refuse downloads larger than this many bytes.
    pub max_download_bytes: u64,
    pub user_agent: String,
}

/// JSONL audit log tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_log: PathBuf,
    pub fallback_log: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

fn default_data_root() -> PathBuf {
    let home_dir = env::var_os("HOME").map_or_else(
        || {
            eprintln!("[PDU-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    );
    home_dir.join(".local").join("share").join("pdu")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_root().join("data"),
            ttl_secs: 600,
            namespace_token_ttl_days: 30,
            sweep_on_submit: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
            reimport_dpi: 150,
            allow_patch_on_xref_streams: false,
            gs_binary: "gs".to_string(),
            qpdf_binary: "qpdf".to_string(),
            pdftk_binary: "pdftk".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            max_download_bytes: 100 * 1024 * 1024,
            user_agent: format!("pdf-unlock/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_log: default_data_root().join("activity.jsonl"),
            fallback_log: Some(PathBuf::from("/dev/shm/pdu.jsonl")),
            max_size_bytes: 100 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

impl StoreConfig {
    /// TTL as a `Duration`.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl PipelineConfig {
    /// Per-tool timeout as a `Duration`.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl Config {
    /// Default configuration path (`~/.config/pdu/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home_dir.join(".config").join("pdu").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PduError::StoreIo {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(PduError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over canonical JSON, stable across processes and Rust releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // store
        if let Some(raw) = env_var("PDU_STORE_DATA_DIR") {
            self.store.data_dir = PathBuf::from(raw);
        }
        set_env_u64("PDU_STORE_TTL_SECS", &mut self.store.ttl_secs)?;
        set_env_u64(
            "PDU_STORE_NAMESPACE_TOKEN_TTL_DAYS",
            &mut self.store.namespace_token_ttl_days,
        )?;
        set_env_bool("PDU_STORE_SWEEP_ON_SUBMIT", &mut self.store.sweep_on_submit)?;

        // pipeline
        set_env_u64(
            "PDU_PIPELINE_TOOL_TIMEOUT_SECS",
            &mut self.pipeline.tool_timeout_secs,
        )?;
        set_env_u32("PDU_PIPELINE_REIMPORT_DPI", &mut self.pipeline.reimport_dpi)?;
        set_env_bool(
            "PDU_PIPELINE_ALLOW_PATCH_ON_XREF_STREAMS",
            &mut self.pipeline.allow_patch_on_xref_streams,
        )?;
        if let Some(raw) = env_var("PDU_PIPELINE_GS_BINARY") {
            self.pipeline.gs_binary = raw;
        }
        if let Some(raw) = env_var("PDU_PIPELINE_QPDF_BINARY") {
            self.pipeline.qpdf_binary = raw;
        }
        if let Some(raw) = env_var("PDU_PIPELINE_PDFTK_BINARY") {
            self.pipeline.pdftk_binary = raw;
        }

        // remote
        set_env_u64(
            "PDU_REMOTE_FETCH_TIMEOUT_SECS",
            &mut self.remote.fetch_timeout_secs,
        )?;
        set_env_u64(
            "PDU_REMOTE_MAX_DOWNLOAD_BYTES",
            &mut self.remote.max_download_bytes,
        )?;

        // logging
        if let Some(raw) = env_var("PDU_LOGGING_JSONL_LOG") {
            self.logging.jsonl_log = PathBuf::from(raw);
        }
        set_env_u64(
            "PDU_LOGGING_MAX_SIZE_BYTES",
            &mut self.logging.max_size_bytes,
        )?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.store.ttl_secs == 0 {
            return Err(PduError::InvalidConfig {
                details: "store.ttl_secs must be > 0".to_string(),
            });
        }
        if self.store.namespace_token_ttl_days == 0 {
            return Err(PduError::InvalidConfig {
                details: "store.namespace_token_ttl_days must be > 0".to_string(),
            });
        }
        if self.pipeline.tool_timeout_secs == 0 {
            return Err(PduError::InvalidConfig {
                details: "pipeline.tool_timeout_secs must be > 0".to_string(),
            });
        }
        if !(36..=600).contains(&self.pipeline.reimport_dpi) {
            return Err(PduError::InvalidConfig {
                details: format!(
                    "pipeline.reimport_dpi must be in [36, 600], got {}",
                    self.pipeline.reimport_dpi
                ),
            });
        }
        for (name, binary) in [
            ("gs_binary", &self.pipeline.gs_binary),
            ("qpdf_binary", &self.pipeline.qpdf_binary),
            ("pdftk_binary", &self.pipeline.pdftk_binary),
        ] {
            if binary.trim().is_empty() {
                return Err(PduError::InvalidConfig {
                    details: format!("pipeline.{name} must not be empty"),
                });
            }
        }
        if self.remote.fetch_timeout_secs == 0 {
            return Err(PduError::InvalidConfig {
                details: "remote.fetch_timeout_secs must be > 0".to_string(),
            });
        }
        if self.remote.max_download_bytes == 0 {
            return Err(PduError::InvalidConfig {
                details: "remote.max_download_bytes must be > 0".to_string(),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(PduError::InvalidConfig {
                details: "logging.max_rotated_files must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| PduError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| PduError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| PduError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = Config::default();
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.store.ttl_secs, 600);
        assert_eq!(cfg.store.namespace_token_ttl_days, 30);
        assert!(cfg.store.sweep_on_submit);
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut cfg = Config::default();
        cfg.store.ttl_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "PDU-1001");
    }

    #[test]
    fn empty_binary_name_rejected() {
        let mut cfg = Config::default();
        cfg.pipeline.qpdf_binary = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reimport_dpi_bounds_enforced() {
        let mut cfg = Config::default();
        cfg.pipeline.reimport_dpi = 10_000;
        assert!(cfg.validate().is_err());
        cfg.pipeline.reimport_dpi = 12;
        assert!(cfg.validate().is_err());
        cfg.pipeline.reimport_dpi = 200;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[store]\nttl_secs = 120\n\n[pipeline]\ntool_timeout_secs = 5\n",
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.store.ttl_secs, 120);
        assert_eq!(cfg.pipeline.tool_timeout_secs, 5);
        // Untouched sections keep defaults.
        assert_eq!(cfg.remote.fetch_timeout_secs, 30);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert_eq!(err.code(), "PDU-1002");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "store = not toml").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(err.code(), "PDU-1003");
    }

    #[test]
    fn stable_hash_is_deterministic() {
        let a = Config::default();
        let b = Config::default();
        assert_eq!(a.stable_hash().unwrap(), b.stable_hash().unwrap());

        let mut c = Config::default();
        c.store.ttl_secs = 601;
        assert_ne!(a.stable_hash().unwrap(), c.stable_hash().unwrap());
    }

    #[test]
    fn durations_convert() {
        let cfg = Config::default();
        assert_eq!(cfg.store.ttl(), Duration::from_secs(600));
        assert_eq!(cfg.pipeline.tool_timeout(), Duration::from_secs(60));
    }
}
