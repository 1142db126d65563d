//! # gibbsmin Core Library
//!
//! Global phase-equilibrium determination for multi-component, multi-phase
//! systems described by sublattice models.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`PhaseDefinition`,
//!   `ConditionSet`, `CompositionSet`), the `EnergyFunction` capability with a
//!   Redlich-Kister reference model, the `Database` trait and simplex geometry.
//!
//! - **[`engine`]: The Logic Core.** The solver stages: degree-of-freedom sampling,
//!   the lower convex hull at the target composition, the recursive minima locator
//!   and tangent-plane polishing, together with configuration, progress and errors.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into a
//!   single equilibrium calculation returning an `EquilibriumResult`.

pub mod core;
pub mod engine;
pub mod workflows;
