use crate::core::models::conditions::ConditionSet;
use crate::engine::config::HullConfig;
use crate::engine::error::{ComponentBracket, EquilibriumError};
use crate::engine::points::{PointId, PointStore};
use crate::engine::utils::simplex_lp::{RevisedSimplex, SimplexError};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, instrument, trace};

/// Phase I residual above which the target composition is unreachable.
const FEASIBILITY_TOLERANCE: f64 = 1e-9;
const PIVOT_TOLERANCE: f64 = 1e-12;
/// Upper bound on lever systems solved while breaking a tie.
const MAX_TIE_SUBSETS: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacetVertex {
    pub point: PointId,
    pub weight: f64,
}

/// The equilibrium facet of the lower envelope at the target composition.
#[derive(Debug, Clone, PartialEq)]
pub struct HullSolution {
    /// Facet vertices with lever-rule weights summing to one, sorted by point id.
    pub vertices: Vec<FacetVertex>,
    /// Chemical potential of every component: the facet plane is `Σ μ_k x_k`.
    pub potentials: Vec<f64>,
    /// Plane value at the target composition.
    pub energy: f64,
    /// Whether other points lay on the facet plane within tolerance.
    pub degenerate: bool,
    pub iterations: usize,
}

/// Lower convex envelope of all candidate points, cut at the target composition.
///
/// The envelope value at `x*` is the linear programme
///
/// ```text
/// minimise Σ λ_j G_j  subject to  Σ λ_j = 1,  Σ λ_j x_jk = x*_k (k fixed),  λ ≥ 0
/// ```
///
/// solved from an artificial basis at the pure-component compositions. The
/// optimal simplex multipliers are the facet plane.
pub struct LowerHullSolver<'a> {
    config: &'a HullConfig,
}

impl<'a> LowerHullSolver<'a> {
    pub fn new(config: &'a HullConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, name = "lower_hull", fields(points = store.len()))]
    pub fn solve(
        &self,
        store: &PointStore,
        phase_names: &[&str],
        conditions: &ConditionSet,
    ) -> Result<HullSolution, EquilibriumError> {
        let points = store.points();
        if points.is_empty() {
            return Err(EquilibriumError::InfeasibleConditions {
                reason: "no candidate points are available".to_string(),
                bracket: Vec::new(),
            });
        }

        let n = conditions.component_count();
        let fixed = conditions.fixed_indices();
        let target = conditions.target_composition();

        let column_of = |x: &[f64]| -> Vec<f64> {
            std::iter::once(1.0)
                .chain(fixed.iter().map(|&k| x[k]))
                .collect()
        };

        // Artificial columns (the pure components) come first.
        let mut columns = DMatrix::<f64>::zeros(n, n + points.len());
        for c in 0..n {
            let mut pure = vec![0.0; n];
            pure[c] = 1.0;
            columns.set_column(c, &DVector::from_vec(column_of(&pure)));
        }
        for (j, point) in points.iter().enumerate() {
            columns.set_column(n + j, &DVector::from_vec(column_of(&point.composition)));
        }
        let rhs = DVector::from_vec(column_of(target));

        let max_iterations = self.config.max_simplex_iterations;
        let to_error = |e: SimplexError| {
            debug!(error = %e, "Simplex failed");
            EquilibriumError::Convergence {
                stage: "lower_hull",
                iterations: max_iterations,
            }
        };

        let mut simplex = RevisedSimplex::new(
            &columns,
            rhs.clone(),
            (0..n).collect(),
            PIVOT_TOLERANCE,
            max_iterations,
        )
        .map_err(to_error)?;

        // Phase I: drive the artificial weight to zero.
        let phase_one_costs: Vec<f64> = (0..n + points.len())
            .map(|j| if j < n { 1.0 } else { 0.0 })
            .collect();
        simplex
            .optimize(&phase_one_costs, |_| true, PIVOT_TOLERANCE)
            .map_err(to_error)?;
        let residual = simplex.objective(&phase_one_costs);
        if residual > FEASIBILITY_TOLERANCE {
            let bracket = component_brackets(store, conditions);
            return Err(EquilibriumError::InfeasibleConditions {
                reason: format!(
                    "target composition lies outside the composition range of the candidate phases (residual {residual:.3e})"
                ),
                bracket,
            });
        }

        for row in 0..n {
            if simplex.basis()[row] < n && !simplex.pivot_out(row, |j| j >= n) {
                trace!(row, "Redundant composition constraint");
            }
        }

        // Phase II on energies shifted by their minimum, which leaves the
        // optimal combination unchanged and keeps the pricing well scaled.
        let shift = points
            .iter()
            .map(|p| p.energy)
            .fold(f64::INFINITY, f64::min);
        let costs: Vec<f64> = (0..n + points.len())
            .map(|j| if j < n { 0.0 } else { points[j - n].energy - shift })
            .collect();
        simplex
            .optimize(&costs, |j| j >= n, self.config.epsilon * 1e-3)
            .map_err(to_error)?;

        let duals = simplex.duals(&costs);
        let mut potentials = vec![duals[0] + shift; n];
        for (row, &k) in fixed.iter().enumerate() {
            potentials[k] = duals[0] + duals[row + 1] + shift;
        }

        let lp_vertices: Vec<(usize, f64)> = simplex
            .basis()
            .iter()
            .zip(simplex.values().iter())
            .filter(|&(&j, &v)| j >= n && v > PIVOT_TOLERANCE)
            .map(|(&j, &v)| (j - n, v))
            .sorted_by_key(|&(j, _)| j)
            .collect();

        let plane_gap = |j: usize| -> f64 {
            let column = columns.column(n + j);
            costs[n + j] - duals.dot(&column)
        };
        let candidates: Vec<usize> = (0..points.len())
            .filter(|&j| plane_gap(j) <= self.config.epsilon)
            .collect();
        let degenerate = candidates.len() > lp_vertices.len();

        let mut selection = lp_vertices.clone();
        if degenerate {
            debug!(
                candidates = candidates.len(),
                basis_vertices = lp_vertices.len(),
                "Numerically degenerate facet, applying tie-break"
            );
            if candidates.len() <= self.config.max_tie_candidates {
                if let Some(chosen) = self.break_tie(
                    &columns,
                    &rhs,
                    n,
                    &candidates,
                    lp_vertices.len(),
                    store,
                    phase_names,
                ) {
                    selection = chosen;
                }
            } else {
                debug!(
                    candidates = candidates.len(),
                    limit = self.config.max_tie_candidates,
                    "Too many tie candidates, keeping simplex basis"
                );
            }
        }

        let vertices = normalize_weights(&selection, self.config.epsilon);
        let energy: f64 = potentials
            .iter()
            .zip(target)
            .map(|(mu, x)| mu * x)
            .sum();

        Ok(HullSolution {
            vertices,
            potentials,
            energy,
            degenerate,
            iterations: simplex.iterations(),
        })
    }

    /// Smallest subset of on-plane candidates whose lever system is solvable with
    /// non-negative weights; ties go to the smallest sorted phase-name tuple,
    /// then the smallest sorted point-id tuple.
    #[allow(clippy::too_many_arguments)]
    fn break_tie(
        &self,
        columns: &DMatrix<f64>,
        rhs: &DVector<f64>,
        offset: usize,
        candidates: &[usize],
        max_size: usize,
        store: &PointStore,
        phase_names: &[&str],
    ) -> Option<Vec<(usize, f64)>> {
        let epsilon = self.config.epsilon;
        let mut solved = 0usize;

        for size in 1..=max_size.max(1) {
            let mut best: Option<(Vec<&str>, Vec<usize>, Vec<f64>)> = None;
            for subset in candidates.iter().copied().combinations(size) {
                solved += 1;
                if solved > MAX_TIE_SUBSETS {
                    debug!("Tie-break subset budget exhausted, keeping simplex basis");
                    return None;
                }
                let Some(weights) = solve_lever_system(columns, rhs, offset, &subset, epsilon)
                else {
                    continue;
                };
                let names: Vec<&str> = subset
                    .iter()
                    .filter_map(|&j| store.get(j))
                    .map(|p| phase_names.get(p.phase).copied().unwrap_or(""))
                    .sorted()
                    .collect();
                let better = match &best {
                    None => true,
                    Some((best_names, best_ids, _)) => {
                        (&names, &subset) < (best_names, best_ids)
                    }
                };
                if better {
                    best = Some((names, subset, weights));
                }
            }
            if let Some((_, ids, weights)) = best {
                return Some(ids.into_iter().zip(weights).collect());
            }
        }
        None
    }
}

/// Least-squares lever weights of `subset`; `None` unless the system is met within
/// `epsilon` with every weight at least `-epsilon`.
fn solve_lever_system(
    columns: &DMatrix<f64>,
    rhs: &DVector<f64>,
    offset: usize,
    subset: &[usize],
    epsilon: f64,
) -> Option<Vec<f64>> {
    let m = rhs.len();
    let matrix = DMatrix::from_fn(m, subset.len(), |r, c| columns[(r, offset + subset[c])]);
    let svd = matrix.clone().svd(true, true);
    let weights = svd.solve(rhs, 1e-12).ok()?;
    let residual = (&matrix * &weights - rhs).norm();
    if residual > epsilon || weights.iter().any(|&w| w < -epsilon) {
        return None;
    }
    Some(weights.iter().copied().collect())
}

/// Clamps weights at zero, drops vanished vertices and rescales the rest to sum
/// to exactly one.
fn normalize_weights(selection: &[(usize, f64)], epsilon: f64) -> Vec<FacetVertex> {
    let kept: Vec<(usize, f64)> = selection
        .iter()
        .map(|&(j, w)| (j, w.max(0.0)))
        .filter(|&(_, w)| w > epsilon * 1e-3)
        .collect();
    let total: f64 = kept.iter().map(|(_, w)| w).sum();
    let mut vertices: Vec<FacetVertex> = kept
        .iter()
        .map(|&(point, w)| FacetVertex {
            point,
            weight: w / total,
        })
        .collect();
    // Absorb the rounding remainder so the weights sum to one exactly.
    if let Some(heaviest) = vertices
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.weight.total_cmp(&b.1.weight))
        .map(|(i, _)| i)
    {
        let others: f64 = vertices
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != heaviest)
            .map(|(_, v)| v.weight)
            .sum();
        vertices[heaviest].weight = 1.0 - others;
    }
    vertices.sort_by_key(|v| v.point);
    vertices
}

fn component_brackets(store: &PointStore, conditions: &ConditionSet) -> Vec<ComponentBracket> {
    conditions
        .components()
        .iter()
        .enumerate()
        .map(|(k, name)| {
            let (min, max) = store
                .points()
                .iter()
                .map(|p| p.composition[k])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                    (lo.min(x), hi.max(x))
                });
            ComponentBracket {
                component: name.clone(),
                min,
                max,
            }
        })
        .collect()
}
