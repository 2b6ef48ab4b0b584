//! Audit coordinator: a dedicated logger thread owning the [`JsonlWriter`].
//!
//! All other threads send [`AuditEvent`] via a bounded crossbeam channel.
//! Non-blocking `try_send()` ensures request handling is never blocked by
//! logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{PduError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events that can be logged through the audit coordinator.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    NamespaceIssued {
        namespace: String,
    },
    ArtifactStaged {
        namespace: String,
        artifact: String,
        original_name: String,
        size_bytes: u64,
    },
    RunCompleted {
        namespace: String,
        artifact: String,
        winning_strategy: Option<String>,
        attempts: usize,
        strategy_trail: Vec<String>,
        duration_ms: u64,
    },
    OutputRecorded {
        namespace: String,
        artifact: String,
        strategy: String,
        size_bytes: u64,
    },
    ArtifactFetched {
        namespace: String,
        artifact: String,
    },
    ArtifactEvicted {
        namespace: String,
        artifact: String,
        details: String,
    },
    SweepCompleted {
        scanned: usize,
        evicted: usize,
        skipped: usize,
        duration_ms: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for sending audit events.
///
/// Internally wraps a bounded crossbeam `Sender`. The `send()` method uses
/// `try_send()` so callers are never blocked by logging back-pressure.
#[derive(Clone)]
pub struct AuditLoggerHandle {
    tx: Sender<AuditEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl AuditLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: AuditEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown and let the logger thread finish.
    pub fn shutdown(&self) {
        let _ = self.tx.send(AuditEvent::Shutdown);
    }
}

/// Options for building the audit logger.
pub struct AuditLoggerConfig {
    /// JSONL writer config.
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread and return a handle.
///
/// The returned handle is `Clone + Send` and can be shared across threads.
/// The logger thread runs until `handle.shutdown()` is called or all
/// senders are dropped.
pub fn spawn_logger(
    config: AuditLoggerConfig,
) -> Result<(AuditLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<AuditEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = AuditLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let log_path = config.jsonl_config.path.clone();
    let join = thread::Builder::new()
        .name("pdu-audit".to_string())
        .spawn(move || {
            logger_thread_main(rx, config.jsonl_config, dropped_clone);
        })
        .map_err(|e| PduError::io(log_path, e))?;

    Ok((handle, join))
}

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(
    rx: Receiver<AuditEvent>,
    jsonl_config: JsonlConfig,
    dropped: Arc<AtomicU64>,
) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    // Process events until Shutdown or channel disconnect.
    while let Ok(event) = rx.recv() {
        // Report dropped events periodically.
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} audit events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, AuditEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    // Final flush.
    jsonl.flush();
    jsonl.fsync();
}

fn event_to_log_entry(event: &AuditEvent) -> LogEntry {
    match event {
        AuditEvent::NamespaceIssued { namespace } => {
            let mut e = LogEntry::new(EventType::NamespaceIssued, Severity::Info);
            e.namespace = Some(namespace.clone());
            e.ok = Some(true);
            e
        }
        AuditEvent::ArtifactStaged {
            namespace,
            artifact,
            original_name,
            size_bytes,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactStaged, Severity::Info);
            e.namespace = Some(namespace.clone());
            e.artifact = Some(artifact.clone());
            e.original_name = Some(original_name.clone());
            e.size = Some(*size_bytes);
            e.ok = Some(true);
            e
        }
        AuditEvent::RunCompleted {
            namespace,
            artifact,
            winning_strategy,
            attempts,
            strategy_trail,
            duration_ms,
        } => {
            let won = winning_strategy.is_some();
            let severity = if won { Severity::Info } else { Severity::Warning };
            let mut e = LogEntry::new(EventType::RunCompleted, severity);
            e.namespace = Some(namespace.clone());
            e.artifact = Some(artifact.clone());
            e.strategy = winning_strategy.clone();
            e.attempts = Some(*attempts);
            e.strategy_trail = Some(strategy_trail.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(won);
            e
        }
        AuditEvent::OutputRecorded {
            namespace,
            artifact,
            strategy,
            size_bytes,
        } => {
            let mut e = LogEntry::new(EventType::OutputRecorded, Severity::Info);
            e.namespace = Some(namespace.clone());
            e.artifact = Some(artifact.clone());
            e.strategy = Some(strategy.clone());
            e.size = Some(*size_bytes);
            e.ok = Some(true);
            e
        }
        AuditEvent::ArtifactFetched {
            namespace,
            artifact,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactFetched, Severity::Info);
            e.namespace = Some(namespace.clone());
            e.artifact = Some(artifact.clone());
            e.ok = Some(true);
            e
        }
        AuditEvent::ArtifactEvicted {
            namespace,
            artifact,
            details,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactEvicted, Severity::Info);
            e.namespace = Some(namespace.clone());
            e.artifact = Some(artifact.clone());
            e.details = Some(details.clone());
            e.ok = Some(true);
            e
        }
        AuditEvent::SweepCompleted {
            scanned,
            evicted,
            skipped,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SweepCompleted, Severity::Info);
            e.scanned = Some(*scanned);
            e.evicted = Some(*evicted);
            e.skipped = Some(*skipped);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        AuditEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        AuditEvent::Shutdown => {
            // Should not reach here; handled above.
            LogEntry::new(EventType::Error, Severity::Info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> AuditLoggerConfig {
        AuditLoggerConfig {
            jsonl_config: JsonlConfig {
                path: dir.join("audit.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(AuditEvent::NamespaceIssued {
            namespace: "a".repeat(32),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert!(contents.contains("namespace_issued"));
    }

    #[test]
    fn multiple_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();

        handle.send(AuditEvent::ArtifactStaged {
            namespace: "b".repeat(32),
            artifact: "c".repeat(16),
            original_name: "report.pdf".to_string(),
            size_bytes: 48_231,
        });
        handle.send(AuditEvent::RunCompleted {
            namespace: "b".repeat(32),
            artifact: "c".repeat(16),
            winning_strategy: Some("qpdf-decrypt".to_string()),
            attempts: 4,
            strategy_trail: vec![
                "gs-enhanced:fail".to_string(),
                "reimport:fail".to_string(),
                "gs-standard:fail".to_string(),
                "qpdf-decrypt:ok".to_string(),
            ],
            duration_ms: 1_420,
        });
        handle.send(AuditEvent::SweepCompleted {
            scanned: 12,
            evicted: 3,
            skipped: 0,
            duration_ms: 7,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("qpdf-decrypt:ok"));
        assert!(contents.contains("sweep_completed"));
    }

    #[test]
    fn handles_cloneable_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        let h2 = handle.clone();

        handle.send(AuditEvent::NamespaceIssued {
            namespace: "d".repeat(32),
        });
        h2.send(AuditEvent::Error {
            code: "PDU-4002".to_string(),
            message: "test error".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("PDU-4002"));
    }

    #[test]
    fn exhausted_run_logged_as_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(AuditEvent::RunCompleted {
            namespace: "e".repeat(32),
            artifact: "f".repeat(16),
            winning_strategy: None,
            attempts: 9,
            strategy_trail: vec!["copy:fail".to_string()],
            duration_ms: 90,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["severity"], "warning");
        assert_eq!(parsed["ok"], false);
    }

    #[test]
    fn dropped_events_counted_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLoggerConfig {
            channel_capacity: 2,
            ..test_config(dir.path())
        };
        let (handle, _join) = spawn_logger(config).unwrap();
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
    }
}
