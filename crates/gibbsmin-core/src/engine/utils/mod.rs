//! Numerical helpers for the engine tasks.
//!
//! - [`simplex_lp`] - the revised simplex behind the lower-hull solver
//! - [`curvature`] - directional curvature estimates used to decide refinement

pub mod curvature;
pub mod simplex_lp;
