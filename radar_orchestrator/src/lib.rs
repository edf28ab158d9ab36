// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Ties the per-crate building blocks (sources, grid, cache, compositor, match,
//! render) into the end-to-end fetch/composite runs the `iradar` binary exposes.

pub mod cli;
pub mod country;
pub mod errors;
pub mod native_affine;
pub mod pipeline;
pub mod summary;

pub use errors::{config_error, RadarOrchestratorError, Result};
pub use pipeline::{CompositeRunConfig, FetchRunConfig, Orchestrator};
pub use summary::RunSummary;
