//! # Core Models Module
//!
//! Data entities shared by every stage of the equilibrium calculation.
//!
//! ## Key Components
//!
//! - [`phase`] - Phase definitions (sublattices, constituents, multiplicities) and the
//!   stoichiometric projection from site fractions to overall mole fractions
//! - [`conditions`] - The fixed temperature, pressure and overall composition of a query
//! - [`composition_set`] - The constitution and amount of one stable phase instance
//! - [`ids`] - Stable keys for phases stored in a database
//!
//! ## Usage
//!
//! ```ignore
//! use gibbsmin::core::models::phase::{PhaseDefinition, Sublattice};
//! use gibbsmin::core::models::conditions::ConditionSet;
//!
//! let fcc = PhaseDefinition::new("FCC_A1", vec![
//!     Sublattice::new(1.0, &["AL", "NI"]),
//!     Sublattice::new(1.0, &["VA"]),
//! ]);
//! fcc.validate()?;
//!
//! let conditions = ConditionSet::new(1200.0, 101325.0, &["AL", "NI"], &[("AL", 0.25)])?;
//! ```

pub mod composition_set;
pub mod conditions;
pub mod ids;
pub mod phase;
