#![forbid(unsafe_code)]

//! pdf_unlock (pdu) removes access restrictions from PDF documents and
//! holds the results in an ephemeral, namespace-isolated store.
//!
//! Two halves:
//! 1. **Unlock pipeline**: an ordered cascade of strategies, from
//!    high-fidelity external tools (Ghostscript, qpdf, pdftk) through a
//!    lossy page re-import down to heuristic byte patches and a verbatim
//!    copy; the first verified success wins.
//! 2. **Artifact store**: namespace-scoped `uploads/` and `processed/`
//!    trees with a 10-minute TTL, swept by a janitor on every submission.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use pdf_unlock::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use pdf_unlock::core::config::Config;
//! use pdf_unlock::pipeline::UnlockPipeline;
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod pipeline;
pub mod probe;
pub mod service;
pub mod store;
