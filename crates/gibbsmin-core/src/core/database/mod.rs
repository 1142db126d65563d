//! # Database Module
//!
//! Access to the candidate phases of a system: their static definitions and the
//! energy function attached to each.
//!
//! ## Overview
//!
//! The solver only ever talks to a [`Database`]. Parsing of thermodynamic database
//! files is left to callers; [`registry::PhaseDatabase`] is an in-memory
//! implementation that can be filled programmatically (any [`EnergyFunction`],
//! including closures) or loaded from a small TOML format describing
//! compound-energy-formalism phases.
//!
//! ## Usage
//!
//! ```ignore
//! use gibbsmin::core::database::{Database, registry::PhaseDatabase};
//!
//! let database = PhaseDatabase::load(Path::new("alni.toml"))?;
//! for name in database.phase_names() {
//!     let phase = database.phase(&name).unwrap();
//!     println!("{name}: {} degrees of freedom", phase.degrees_of_freedom());
//! }
//! ```

pub mod registry;

use crate::core::energy::EnergyFunction;
use crate::core::models::phase::PhaseDefinition;

/// Read-only access to phase definitions and their energy functions.
pub trait Database: Send + Sync {
    /// Names of every phase, in a stable sorted order.
    fn phase_names(&self) -> Vec<String>;

    fn phase(&self, name: &str) -> Option<&PhaseDefinition>;

    fn energy_function(&self, name: &str) -> Option<&dyn EnergyFunction>;
}
