//! Unlock strategy cascade: ordered tiers from high-fidelity external
//! tools down to heuristic byte patches and a verbatim-copy last resort.

pub mod external;
pub mod patch;
#[cfg(feature = "reimport")]
pub mod reimport;
pub mod runner;
pub mod strategy;

pub use runner::{PipelineRun, UnlockPipeline};
pub use strategy::{StrategyContext, UnlockOutcome, UnlockStrategy};
