//! Configuration module for the ticketflow runtime
//!
//! A single TOML document describes the tracker, the language model, the
//! prediction service and the reconciliation/dedup tunables. Every section
//! has defaults, so a partial file (or no file at all) is valid.

pub mod types;

pub use types::*;
