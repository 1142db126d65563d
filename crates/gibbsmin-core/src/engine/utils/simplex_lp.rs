//! Dense revised simplex over a column matrix with an explicit basis inverse.
//!
//! Only what the hull solver needs: a caller-supplied feasible starting basis,
//! Dantzig pricing with a switch to Bland's rule after a run of degenerate
//! pivots, and periodic refactorisation of the basis inverse.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::trace;

const REFACTOR_INTERVAL: usize = 50;
const DEGENERATE_STREAK_LIMIT: usize = 25;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimplexError {
    #[error("iteration limit of {0} reached")]
    IterationLimit(usize),
    #[error("basis matrix became singular")]
    SingularBasis,
    #[error("objective is unbounded")]
    Unbounded,
}

pub struct RevisedSimplex<'a> {
    columns: &'a DMatrix<f64>,
    rhs: DVector<f64>,
    basis: Vec<usize>,
    in_basis: Vec<bool>,
    inverse: DMatrix<f64>,
    values: DVector<f64>,
    pivot_tolerance: f64,
    iterations: usize,
    max_iterations: usize,
    pivots_since_refactor: usize,
    use_bland: bool,
    degenerate_streak: usize,
}

impl<'a> RevisedSimplex<'a> {
    /// Starts from `basis`, which must be a feasible basis for `columns λ = rhs`.
    pub fn new(
        columns: &'a DMatrix<f64>,
        rhs: DVector<f64>,
        basis: Vec<usize>,
        pivot_tolerance: f64,
        max_iterations: usize,
    ) -> Result<Self, SimplexError> {
        let m = rhs.len();
        let mut in_basis = vec![false; columns.ncols()];
        for &j in &basis {
            in_basis[j] = true;
        }
        let mut simplex = Self {
            columns,
            rhs,
            basis,
            in_basis,
            inverse: DMatrix::identity(m, m),
            values: DVector::zeros(m),
            pivot_tolerance,
            iterations: 0,
            max_iterations,
            pivots_since_refactor: 0,
            use_bland: false,
            degenerate_streak: 0,
        };
        simplex.refactor()?;
        Ok(simplex)
    }

    pub fn basis(&self) -> &[usize] {
        &self.basis
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn objective(&self, costs: &[f64]) -> f64 {
        self.basis
            .iter()
            .zip(self.values.iter())
            .map(|(&j, v)| costs[j] * v)
            .sum()
    }

    /// Simplex multipliers `π = B^-T c_B`.
    pub fn duals(&self, costs: &[f64]) -> DVector<f64> {
        let c_b = DVector::from_iterator(self.basis.len(), self.basis.iter().map(|&j| costs[j]));
        self.inverse.transpose() * c_b
    }

    fn refactor(&mut self) -> Result<(), SimplexError> {
        let m = self.rhs.len();
        let mut matrix = DMatrix::zeros(m, m);
        for (k, &j) in self.basis.iter().enumerate() {
            matrix.set_column(k, &self.columns.column(j));
        }
        self.inverse = matrix.try_inverse().ok_or(SimplexError::SingularBasis)?;
        self.values = &self.inverse * &self.rhs;
        for v in self.values.iter_mut() {
            if *v < 0.0 && *v > -self.pivot_tolerance {
                *v = 0.0;
            }
        }
        self.pivots_since_refactor = 0;
        Ok(())
    }

    fn pivot(&mut self, row: usize, entering: usize, direction: &DVector<f64>) {
        let m = self.rhs.len();
        let pivot = direction[row];
        let theta = self.values[row] / pivot;

        for i in 0..m {
            if i != row {
                self.values[i] -= theta * direction[i];
                if self.values[i] < 0.0 && self.values[i] > -self.pivot_tolerance {
                    self.values[i] = 0.0;
                }
            }
        }
        self.values[row] = theta;

        for k in 0..m {
            self.inverse[(row, k)] /= pivot;
        }
        for i in 0..m {
            let factor = direction[i];
            if i == row || factor == 0.0 {
                continue;
            }
            for k in 0..m {
                let v = self.inverse[(row, k)];
                self.inverse[(i, k)] -= factor * v;
            }
        }

        self.in_basis[self.basis[row]] = false;
        self.in_basis[entering] = true;
        self.basis[row] = entering;
        self.pivots_since_refactor += 1;
    }

    /// Pivots until no column admitted by `can_enter` has a reduced cost below
    /// `-reduced_cost_tolerance`.
    pub fn optimize<F>(
        &mut self,
        costs: &[f64],
        can_enter: F,
        reduced_cost_tolerance: f64,
    ) -> Result<(), SimplexError>
    where
        F: Fn(usize) -> bool,
    {
        loop {
            if self.iterations >= self.max_iterations {
                return Err(SimplexError::IterationLimit(self.iterations));
            }

            let duals = self.duals(costs);
            let mut entering = None;
            let mut best = -reduced_cost_tolerance;
            for j in 0..self.columns.ncols() {
                if self.in_basis[j] || !can_enter(j) {
                    continue;
                }
                let reduced = costs[j] - duals.dot(&self.columns.column(j));
                if self.use_bland {
                    if reduced < -reduced_cost_tolerance {
                        entering = Some(j);
                        break;
                    }
                } else if reduced < best {
                    best = reduced;
                    entering = Some(j);
                }
            }
            let Some(entering) = entering else {
                return Ok(());
            };

            let direction = &self.inverse * self.columns.column(entering);
            let mut leaving: Option<(usize, f64)> = None;
            for (row, &u) in direction.iter().enumerate() {
                if u <= self.pivot_tolerance {
                    continue;
                }
                let ratio = self.values[row].max(0.0) / u;
                leaving = match leaving {
                    Some((r, best_ratio))
                        if best_ratio < ratio
                            || (best_ratio == ratio && self.basis[r] < self.basis[row]) =>
                    {
                        Some((r, best_ratio))
                    }
                    _ => Some((row, ratio)),
                };
            }
            let Some((row, theta)) = leaving else {
                return Err(SimplexError::Unbounded);
            };

            trace!(entering, leaving = self.basis[row], theta, "Simplex pivot");
            self.pivot(row, entering, &direction);
            self.iterations += 1;

            if theta <= self.pivot_tolerance {
                self.degenerate_streak += 1;
                if self.degenerate_streak > DEGENERATE_STREAK_LIMIT && !self.use_bland {
                    trace!("Switching to Bland's rule after repeated degenerate pivots");
                    self.use_bland = true;
                }
            } else {
                self.degenerate_streak = 0;
            }

            if self.pivots_since_refactor >= REFACTOR_INTERVAL {
                self.refactor()?;
            }
        }
    }

    /// Replaces the basic variable of `row` by any admitted non-basic column with
    /// a non-zero entry in that row. Returns `false` when the row is redundant.
    pub fn pivot_out<F>(&mut self, row: usize, can_enter: F) -> bool
    where
        F: Fn(usize) -> bool,
    {
        for j in 0..self.columns.ncols() {
            if self.in_basis[j] || !can_enter(j) {
                continue;
            }
            let direction = &self.inverse * self.columns.column(j);
            if direction[row].abs() > self.pivot_tolerance {
                self.pivot(row, j, &direction);
                return true;
            }
        }
        false
    }
}
