//! Collaborator-facing facade: namespace issuance, document submission,
//! listing, and retrieval, with the janitor and audit log wired in.
//!
//! Each submission is one independent unit of work: stage the input, run
//! the cascade into the processed tree, persist the metadata sidecar, and
//! report. There is no shared mutable state beyond the store (filesystem)
//! and the audit handle (non-blocking channel), so the facade is freely
//! shareable across threads.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{PduError, Result};
use crate::core::ids;
use crate::logger::{AuditEvent, AuditLoggerHandle, JsonlConfig};
use crate::pipeline::{StrategyContext, UnlockPipeline};
use crate::probe::ToolInventory;
use crate::store::{ArtifactKind, ArtifactListing, ArtifactMetadata, ArtifactSource, ArtifactStore, SweepReport};
use crate::store::artifact::digest_hex;

/// Fallback display name when none can be derived.
const DEFAULT_NAME: &str = "document.pdf";

/// Receipt for an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub artifact_id: String,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
    /// Cascade tier that produced the stored output.
    pub winning_strategy: String,
}

/// The service: owns the store and the cascade, borrows nothing.
pub struct UnlockService {
    config: Config,
    store: ArtifactStore,
    pipeline: UnlockPipeline,
    audit: AuditLoggerHandle,
}

impl UnlockService {
    pub fn new(config: Config, audit: AuditLoggerHandle) -> Self {
        let store = ArtifactStore::new(&config.store);
        Self {
            config,
            store,
            pipeline: UnlockPipeline::default_cascade(),
            audit,
        }
    }

    /// Swap in a custom cascade. Tests use this to run hermetically.
    pub fn with_pipeline(mut self, pipeline: UnlockPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// First contact: mint a namespace token for the caller to persist.
    /// The token's lifetime is advisory; the store only ever scopes paths
    /// by it.
    pub fn issue_namespace(&self) -> String {
        let namespace = ids::generate_namespace();
        self.audit.send(AuditEvent::NamespaceIssued {
            namespace: namespace.clone(),
        });
        namespace
    }

    /// Submit raw document bytes for unlocking.
    pub fn submit_bytes(
        &self,
        namespace: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<Submission> {
        self.submit(namespace, original_name, bytes, ArtifactSource::Upload)
    }

    /// Submit a document by URL. The download is re-validated exactly like
    /// an upload; a body that is not a PDF never becomes an artifact.
    #[cfg(feature = "remote")]
    pub fn submit_url(&self, namespace: &str, url: &str) -> Result<Submission> {
        ids::validate_namespace(namespace)?;
        let bytes = self.download(url)?;
        let name = filename_from_url(url);
        self.submit(namespace, &name, &bytes, ArtifactSource::Url { url: url.to_string() })
    }

    /// Live output artifacts of a namespace, newest first.
    pub fn list(&self, namespace: &str) -> Result<Vec<ArtifactListing>> {
        self.store.list(namespace)
    }

    /// Fetch an unlocked document's bytes. An artifact removed by lazy
    /// expiry during the read is audited as an eviction.
    pub fn retrieve(&self, namespace: &str, id: &str) -> Result<Vec<u8>> {
        match self.store.fetch(namespace, id, ArtifactKind::Output) {
            Ok(bytes) => {
                self.audit.send(AuditEvent::ArtifactFetched {
                    namespace: namespace.to_string(),
                    artifact: id.to_string(),
                });
                Ok(bytes)
            }
            Err(err @ PduError::Gone { .. }) => {
                self.audit.send(AuditEvent::ArtifactEvicted {
                    namespace: namespace.to_string(),
                    artifact: id.to_string(),
                    details: "ttl expired at read time".to_string(),
                });
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Run a janitor sweep now, regardless of `sweep_on_submit`. Every
    /// removed artifact is audited individually before the summary record.
    pub fn sweep(&self) -> SweepReport {
        let started = std::time::Instant::now();
        let report = self.store.sweep_with(|eviction| {
            self.audit.send(AuditEvent::ArtifactEvicted {
                namespace: eviction.namespace,
                artifact: eviction.artifact,
                details: format!("ttl expired ({})", eviction.kind.dir_name()),
            });
        });
        self.audit.send(AuditEvent::SweepCompleted {
            scanned: report.scanned,
            evicted: report.evicted,
            skipped: report.skipped,
            duration_ms: millis(started.elapsed()),
        });
        report
    }

    // ──────────────────────── internals ────────────────────────

    fn submit(
        &self,
        namespace: &str,
        original_name: &str,
        bytes: &[u8],
        source: ArtifactSource,
    ) -> Result<Submission> {
        if self.config.store.sweep_on_submit {
            self.sweep();
        }

        let display_name = sanitize_name(original_name);
        let input = self.store.stage(namespace, bytes)?;
        self.audit.send(AuditEvent::ArtifactStaged {
            namespace: namespace.to_string(),
            artifact: input.id.clone(),
            original_name: display_name.clone(),
            size_bytes: bytes.len() as u64,
        });

        let output_path = self.store.output_path(namespace, &input.id)?;
        let tools = ToolInventory::new();
        let cx = StrategyContext {
            tools: &tools,
            config: &self.config.pipeline,
        };
        let run = match self.pipeline.run(&input.path, &output_path, &cx) {
            Ok(run) => run,
            Err(e) => {
                // Keep the run error even if the discard itself fails.
                let _ = self.store.discard_input(namespace, &input.id);
                return Err(e);
            }
        };

        self.audit.send(AuditEvent::RunCompleted {
            namespace: namespace.to_string(),
            artifact: input.id.clone(),
            winning_strategy: run.winning_strategy.map(str::to_string),
            attempts: run.attempts(),
            strategy_trail: run
                .outcomes
                .iter()
                .map(|o| format!("{}:{}", o.strategy, if o.success { "ok" } else { "fail" }))
                .collect(),
            duration_ms: millis(run.duration),
        });

        let Some(winning) = run.winning_strategy else {
            let err = run.exhausted_error();
            self.audit.send(AuditEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            });
            let _ = self.store.discard_input(namespace, &input.id);
            return Err(err);
        };

        let output_bytes =
            std::fs::read(&output_path).map_err(|e| PduError::io(&output_path, e))?;
        let created_at = Utc::now();
        let expires_at = created_at + ttl_delta(self.config.store.ttl_secs);
        let metadata = ArtifactMetadata {
            original_name: display_name.clone(),
            created_at,
            expires_at,
            source,
            sha256: digest_hex(&output_bytes),
            winning_strategy: winning.to_string(),
        };
        self.store.record_output(namespace, &input.id, &metadata)?;
        self.audit.send(AuditEvent::OutputRecorded {
            namespace: namespace.to_string(),
            artifact: input.id.clone(),
            strategy: winning.to_string(),
            size_bytes: output_bytes.len() as u64,
        });

        Ok(Submission {
            artifact_id: input.id,
            display_name,
            expires_at,
            winning_strategy: winning.to_string(),
        })
    }

    #[cfg(feature = "remote")]
    fn download(&self, url: &str) -> Result<Vec<u8>> {
        use std::io::Read;
        use std::time::Duration;

        let unavailable = |details: String| PduError::SourceUnavailable {
            url: url.to_string(),
            details,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.config.remote.fetch_timeout_secs))
            .user_agent(self.config.remote.user_agent.clone())
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP status {}", response.status())));
        }

        let limit = self.config.remote.max_download_bytes;
        if let Some(length) = response.content_length()
            && length > limit
        {
            return Err(unavailable(format!(
                "declared size {length} exceeds limit {limit}"
            )));
        }

        // Read one byte past the cap to distinguish "at limit" from "over".
        let mut body = Vec::new();
        response
            .take(limit + 1)
            .read_to_end(&mut body)
            .map_err(|e| unavailable(e.to_string()))?;
        if body.len() as u64 > limit {
            return Err(unavailable(format!("download exceeds limit {limit}")));
        }

        crate::core::document::validate_bytes(&body)?;
        Ok(body)
    }
}

/// Build a JSONL writer config from the service's logging section.
pub fn jsonl_config(config: &Config) -> JsonlConfig {
    JsonlConfig {
        path: config.logging.jsonl_log.clone(),
        fallback_path: config.logging.fallback_log.clone(),
        max_size_bytes: config.logging.max_size_bytes,
        max_rotated_files: config.logging.max_rotated_files,
        fsync_interval_secs: config.logging.fsync_interval_secs,
    }
}

/// Keep only the final path component of a client-supplied name; clients
/// send whatever their filesystem called the file.
fn sanitize_name(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        DEFAULT_NAME.to_string()
    } else {
        base.to_string()
    }
}

/// Derive a display name from a URL path, falling back to a generic one.
#[cfg(feature = "remote")]
fn filename_from_url(url: &str) -> String {
    let path = url
        .split('#')
        .next()
        .and_then(|u| u.split('?').next())
        .unwrap_or_default();
    let candidate = path.rsplit('/').next().unwrap_or_default();
    if candidate.is_empty() || !candidate.to_ascii_lowercase().ends_with(".pdf") {
        DEFAULT_NAME.to_string()
    } else {
        sanitize_name(candidate)
    }
}

fn ttl_delta(ttl_secs: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
