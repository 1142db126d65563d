//! Numerical helpers shared by the sampler, the locator and the polisher.

pub mod simplex;
