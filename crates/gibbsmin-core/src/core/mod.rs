//! # Core Module
//!
//! Stateless building blocks shared by every stage of a calculation.
//!
//! ## Architecture
//!
//! - **Models** ([`models`]) - Phase definitions, conditions and composition sets
//! - **Energy** ([`energy`]) - The `EnergyFunction` capability and the Redlich-Kister model
//! - **Database** ([`database`]) - Phase lookup and the TOML-backed `PhaseDatabase`
//! - **Utilities** ([`utils`]) - Simplex projection, grids and random points
//!
//! ## Scientific Foundation
//!
//! - **Compound energy formalism** for phases with several sublattices
//! - **Redlich-Kister polynomials** with Muggianu extrapolation for excess energies
//! - **Ideal mixing** on each sublattice, with vacancies diluting the atom count

pub mod database;
pub mod energy;
pub mod models;
pub mod utils;
