//! # Energy Module
//!
//! The Gibbs-energy side of the calculation. The solver treats every phase's energy
//! model as a black box behind [`EnergyFunction`]: a map from a site-fraction vector,
//! temperature and pressure to a molar Gibbs energy (per mole of atoms) and its
//! gradient with respect to the site fractions.
//!
//! ## Key Components
//!
//! - [`term`] - The value/gradient pair returned by an energy evaluation
//! - [`params`] - Temperature expressions and raw model parameters as loaded from files
//! - [`potentials`] - Scalar building blocks (configurational entropy term, gas constant)
//! - [`redlich_kister`] - A compound-energy-formalism reference model with Redlich-Kister
//!   excess terms, usable wherever an external model is not available
//!
//! Any `Fn(&[f64], f64, f64) -> EnergyEvaluation + Send + Sync` closure is an
//! [`EnergyFunction`], which keeps synthetic test surfaces short.

pub mod params;
pub mod potentials;
pub mod redlich_kister;
pub mod term;

pub use term::EnergyEvaluation;

/// Evaluates the molar Gibbs energy of one phase.
///
/// Implementations must be pure: identical inputs give identical outputs. The
/// gradient has the same length and layout as `site_fractions`.
pub trait EnergyFunction: Send + Sync {
    fn evaluate(&self, site_fractions: &[f64], temperature: f64, pressure: f64) -> EnergyEvaluation;
}

impl<F> EnergyFunction for F
where
    F: Fn(&[f64], f64, f64) -> EnergyEvaluation + Send + Sync,
{
    fn evaluate(&self, site_fractions: &[f64], temperature: f64, pressure: f64) -> EnergyEvaluation {
        self(site_fractions, temperature, pressure)
    }
}
