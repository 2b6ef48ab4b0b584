//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use pdf_unlock::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{PduError, Result};

// Probe
pub use crate::probe::{ExternalTool, ToolInventory, ToolStatus};

// Pipeline
pub use crate::pipeline::{
    PipelineRun, StrategyContext, UnlockOutcome, UnlockPipeline, UnlockStrategy,
};

// Store
pub use crate::store::{
    Artifact, ArtifactKind, ArtifactListing, ArtifactMetadata, ArtifactSource, ArtifactStore,
    SweepReport,
};

// Service
pub use crate::service::{Submission, UnlockService};

// Logger
pub use crate::logger::{AuditEvent, AuditLoggerHandle, spawn_logger};
