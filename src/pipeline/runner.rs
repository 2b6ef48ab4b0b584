//! Ordered strategy cascade.
//!
//! Strategies run in a fixed priority order; the first verified success
//! wins and later tiers never run. Every attempt, failed or not, is kept
//! in the run record so the audit trail shows exactly what was tried.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::core::document;
use crate::core::errors::PduError;
use crate::pipeline::external::{
    GhostscriptEnhanced, GhostscriptStandard, PdftkAllowAll, QpdfDecrypt,
};
use crate::pipeline::patch::{DictionaryPatch, MetadataPatch, RestrictionPatch};
#[cfg(feature = "reimport")]
use crate::pipeline::reimport::PageReimport;
use crate::pipeline::strategy::{LastResortCopy, StrategyContext, UnlockOutcome, UnlockStrategy};

/// Record of one complete cascade run over a single document.
#[derive(Debug)]
pub struct PipelineRun {
    /// Name of the strategy that produced the accepted output, if any.
    pub winning_strategy: Option<&'static str>,
    /// Every attempt made, in cascade order. The winning attempt is last.
    pub outcomes: Vec<UnlockOutcome>,
    pub duration: Duration,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        self.winning_strategy.is_some()
    }

    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }

    /// The terminal error for a run where every tier failed.
    ///
    /// Only meaningful when `winning_strategy` is `None`; the copy tier is
    /// last in the cascade, so exhaustion means even a verbatim copy of the
    /// input could not be produced.
    pub fn exhausted_error(&self) -> PduError {
        let details = self
            .outcomes
            .iter()
            .map(|o| format!("{}: {}", o.strategy, o.diagnostic))
            .collect::<Vec<_>>()
            .join("; ");
        PduError::PipelineExhausted {
            attempts: self.attempts(),
            details,
        }
    }
}

/// The cascade itself: an ordered list of strategies.
pub struct UnlockPipeline {
    strategies: Vec<Box<dyn UnlockStrategy>>,
}

impl UnlockPipeline {
    pub fn new(strategies: Vec<Box<dyn UnlockStrategy>>) -> Self {
        Self { strategies }
    }

    /// The full cascade in priority order. The enhanced Ghostscript pass
    /// leads because it has the best fidelity-to-success ratio; the lossy
    /// page re-import outranks the remaining tools because it defeats
    /// schemes they cannot; the byte-patch tiers are fallbacks; the
    /// verbatim copy is the unconditional last resort.
    pub fn default_cascade() -> Self {
        let mut strategies: Vec<Box<dyn UnlockStrategy>> =
            vec![Box::new(GhostscriptEnhanced)];
        #[cfg(feature = "reimport")]
        strategies.push(Box::new(PageReimport));
        strategies.push(Box::new(GhostscriptStandard));
        strategies.push(Box::new(QpdfDecrypt));
        strategies.push(Box::new(PdftkAllowAll));
        strategies.push(Box::new(DictionaryPatch));
        strategies.push(Box::new(MetadataPatch));
        strategies.push(Box::new(RestrictionPatch));
        strategies.push(Box::new(LastResortCopy));
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the cascade for `input`, writing the accepted output to `output`.
    ///
    /// Returns `Ok` for any completed run, including one where every tier
    /// failed; callers inspect [`PipelineRun::winning_strategy`] and use
    /// [`PipelineRun::exhausted_error`] for the terminal case. `Err` is
    /// reserved for precondition failures such as a non-PDF input.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        cx: &StrategyContext<'_>,
    ) -> Result<PipelineRun, PduError> {
        if !document::file_has_pdf_header(input) {
            return Err(PduError::InvalidDocument {
                details: "missing %PDF magic header".to_string(),
            });
        }

        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(self.strategies.len());
        let mut winning_strategy = None;

        for strategy in &self.strategies {
            let outcome = strategy.attempt(input, output, cx);
            let won = outcome.success;
            if won {
                winning_strategy = Some(outcome.strategy);
            }
            outcomes.push(outcome);
            if won {
                break;
            }
        }

        Ok(PipelineRun {
            winning_strategy,
            outcomes,
            duration: started.elapsed(),
        })
    }
}
