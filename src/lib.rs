#![forbid(unsafe_code)]

//! `geofix_core` — geospatial error-correction core.
//!
//! Detects topological and semantic defects in a set of polygon features,
//! resolves each one through a three-tier decision engine (deterministic
//! rules, a pluggable reasoning oracle, human review), applies and
//! validates the chosen repair through a closed registry of operations,
//! and records every decision in an append-only audit log.

pub mod audit;
#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod decision;
pub mod detector;
pub mod fixes;
pub mod geometry;
pub mod ingest;
pub mod model;
#[cfg(feature = "sqlite")]
pub mod pipeline;
pub mod validator;
