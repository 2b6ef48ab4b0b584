//! Core types: errors, configuration, identifier rules.

pub mod config;
pub mod document;
pub mod errors;
pub mod ids;
