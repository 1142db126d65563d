//! # Workflows Module
//!
//! High-level entry points that run a complete calculation from a database and
//! a set of conditions to a finished result.
//!
//! ## Architecture
//!
//! - **Equilibrium Workflow** ([`equilibrium`]) - Global minimisation of the Gibbs energy:
//!   sampling, lower hull, recursive refinement, polishing and assembly of the
//!   stable composition sets.
//!
//! The workflow owns no state between calls. Progress events go to the supplied
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter) and a
//! [`CancellationToken`](crate::engine::progress::CancellationToken) can stop a
//! running calculation between phases.

pub mod equilibrium;
