//! Computational stages of an equilibrium calculation.
//!
//! Each submodule owns one stage: sampling the internal degrees of freedom of
//! every phase, solving the lower convex hull at the target composition,
//! searching for driving-force minima the sampling missed, and polishing facet
//! vertices against the current tangent plane.

pub mod lower_hull;
pub mod minima_locator;
pub mod polish;
pub mod sampling;
