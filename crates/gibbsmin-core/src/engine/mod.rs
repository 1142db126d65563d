//! # Engine Module
//!
//! The solver machinery behind a global equilibrium calculation.
//!
//! ## Overview
//!
//! A calculation samples the internal degrees of freedom of every candidate
//! phase, solves the lower convex hull of all sampled points at the target
//! composition, and then adds points where the current tangent plane shows a
//! phase could still lower the hull: first by a branch-and-bound search over
//! the site-fraction domain, then by local polishing of the facet vertices.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Numerical tolerances and limits, with TOML loading
//! - **Context** ([`context`]) - Per-calculation references and the candidate phase view
//! - **Points** ([`points`]) - The append-only candidate point store and duplicate index
//! - **State Tracking** ([`state`]) - Current hull, accumulated points and diagnostics
//! - **Tasks** ([`tasks`]) - Sampling, hull, minima search and polishing stages
//! - **Progress Monitoring** ([`progress`]) - Progress events and cancellation
//! - **Error Handling** ([`error`]) - The calculation error type

pub mod config;
pub mod context;
pub mod error;
pub mod points;
pub mod progress;
pub mod state;
pub mod tasks;
pub(crate) mod utils;
