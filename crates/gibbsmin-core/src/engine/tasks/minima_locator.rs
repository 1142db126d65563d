use crate::core::models::conditions::ConditionSet;
use crate::engine::config::RefinementConfig;
use crate::engine::context::CandidatePhase;
use crate::engine::error::EquilibriumError;
use crate::engine::progress::CancellationToken;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, trace};

/// Trial points with a site fraction at or below this sit on the simplex boundary,
/// where ideal-mixing gradients diverge while the energy rises towards it.
/// They take part in the search but not in the Lipschitz estimate.
const BOUNDARY_SITE_FRACTION: f64 = 1e-9;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Axis-aligned box in reduced site-fraction coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainBox {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub depth: usize,
}

impl DomainBox {
    pub fn unit(dimension: usize) -> Self {
        Self {
            lower: vec![0.0; dimension],
            upper: vec![1.0; dimension],
            depth: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn centroid(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(l, u)| 0.5 * (l + u))
            .collect()
    }

    /// Euclidean length of the box diagonal.
    pub fn diameter(&self) -> f64 {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(l, u)| (u - l) * (u - l))
            .sum::<f64>()
            .sqrt()
    }

    pub fn radius(&self) -> f64 {
        0.5 * self.diameter()
    }

    /// Distance from `point` to the farthest corner of the box.
    pub fn farthest_distance(&self, point: &[f64]) -> f64 {
        self.lower
            .iter()
            .zip(&self.upper)
            .zip(point)
            .map(|((l, u), p)| {
                let reach = (p - l).abs().max((u - p).abs());
                reach * reach
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Splits the longest edge in half; ties go to the lowest axis.
    pub fn bisect(&self) -> (Self, Self) {
        let axis = (0..self.dimension())
            .fold(0, |best, i| {
                let width = self.upper[i] - self.lower[i];
                if width > self.upper[best] - self.lower[best] {
                    i
                } else {
                    best
                }
            });
        let middle = 0.5 * (self.lower[axis] + self.upper[axis]);

        let mut left = self.clone();
        left.upper[axis] = middle;
        left.depth += 1;
        let mut right = self.clone();
        right.lower[axis] = middle;
        right.depth += 1;
        (left, right)
    }

    /// Whether the box still touches the product of simplices, i.e. the lower
    /// corner of every sublattice block sums to at most one.
    pub fn intersects_domain(&self, blocks: &[Range<usize>]) -> bool {
        blocks
            .iter()
            .all(|b| self.lower[b.clone()].iter().sum::<f64>() <= 1.0)
    }

    /// Evaluation points: the centroid first, then every corner when the box is
    /// small-dimensional, otherwise the two face centres along each axis.
    pub fn trial_points(&self, max_corner_dims: usize) -> Vec<Vec<f64>> {
        let centroid = self.centroid();
        let d = self.dimension();
        let mut points = vec![centroid.clone()];
        if d <= max_corner_dims {
            for mask in 0..(1usize << d) {
                points.push(
                    (0..d)
                        .map(|i| {
                            if mask & (1 << i) == 0 {
                                self.lower[i]
                            } else {
                                self.upper[i]
                            }
                        })
                        .collect(),
                );
            }
        } else {
            for i in 0..d {
                for bound in [self.lower[i], self.upper[i]] {
                    let mut point = centroid.clone();
                    point[i] = bound;
                    points.push(point);
                }
            }
        }
        points
    }
}

/// Lowest driving force seen so far, shared between parallel box evaluations.
#[derive(Debug)]
pub struct SharedMinimum {
    bits: AtomicU64,
}

impl SharedMinimum {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(f64::INFINITY.to_bits()),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Lowers the stored value to `value` if smaller.
    pub fn fetch_min(&self, value: f64) {
        let mut current = self.bits.load(Ordering::Acquire);
        while value < f64::from_bits(current) {
            match self.bits.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for SharedMinimum {
    fn default() -> Self {
        Self::new()
    }
}

/// A constitution found by the locator.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedPoint {
    /// Active site fractions.
    pub site_fractions: Vec<f64>,
    pub energy: f64,
    pub composition: Vec<f64>,
    pub driving_force: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocatorReport {
    pub points: Vec<LocatedPoint>,
    pub boxes_evaluated: usize,
    pub pruned: usize,
    pub accepted: usize,
    pub max_depth_hits: usize,
    pub truncated: usize,
    /// Set when depth or frontier limits cut the search short.
    pub approximate: bool,
    pub best: Option<f64>,
}

#[derive(Clone)]
struct TrialPoint {
    /// Reduced coordinates of the evaluated (feasible) constitution.
    reduced: Vec<f64>,
    driving_force: f64,
    energy: f64,
    composition: Vec<f64>,
    gradient_norm: f64,
    on_boundary: bool,
}

struct BoxEvaluation {
    /// Centroid if finite, else the best finite trial point.
    representative: Option<TrialPoint>,
    /// Lowest finite trial point.
    best: Option<TrialPoint>,
    lower_bound: f64,
}

/// A box waiting for the next level, ranked by what its parent showed.
struct Pending {
    observed: f64,
    lower_bound: f64,
    domain: DomainBox,
}

/// Branch-and-bound search for the driving-force minima of one phase.
///
/// The reduced site-fraction box is bisected recursively. A box whose Lipschitz
/// lower bound `f(c) - L r` lies above the best value found is discarded; boxes
/// that shrink below the resolution are accepted and their centroids returned.
/// Every box of a level is evaluated before any pruning decision is made, which
/// keeps the outcome independent of thread scheduling.
pub struct RecursiveMinimaLocator<'a> {
    config: &'a RefinementConfig,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> RecursiveMinimaLocator<'a> {
    pub fn new(config: &'a RefinementConfig) -> Self {
        Self {
            config,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<&'a CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    #[instrument(skip_all, name = "minima_locator", fields(phase = phase.name(), dof = phase.degrees_of_freedom()))]
    pub fn locate(
        &self,
        phase: &CandidatePhase,
        conditions: &ConditionSet,
        potentials: &[f64],
    ) -> Result<LocatorReport, EquilibriumError> {
        let mut report = LocatorReport::default();
        let dimension = phase.degrees_of_freedom();
        if dimension == 0 {
            return Ok(report);
        }

        let reduced_blocks = phase.layout().reduced_blocks();
        let best = SharedMinimum::new();
        let mut frontier = vec![DomainBox::unit(dimension)];

        while !frontier.is_empty() {
            if self.cancellation.is_some_and(|t| t.is_cancelled()) {
                return Err(EquilibriumError::Cancelled);
            }

            let evaluate = |domain: &DomainBox| self.evaluate_box(domain, phase, conditions, potentials, &best);
            #[cfg(not(feature = "parallel"))]
            let evaluations: Result<Vec<_>, _> = frontier.iter().map(evaluate).collect();
            #[cfg(feature = "parallel")]
            let evaluations: Result<Vec<_>, _> = frontier.par_iter().map(evaluate).collect();
            let evaluations = evaluations?;
            report.boxes_evaluated += frontier.len();

            let threshold = best.get() + self.config.prune_tolerance;
            let mut next = Vec::new();
            for (domain, evaluation) in frontier.into_iter().zip(evaluations) {
                let Some(representative) = evaluation.representative else {
                    trace!(depth = domain.depth, "No finite trial point in box");
                    report.pruned += 1;
                    continue;
                };
                if evaluation.lower_bound > threshold {
                    report.pruned += 1;
                } else if domain.diameter() < self.config.resolution {
                    report.accepted += 1;
                    report.points.push(located(phase, representative));
                } else if domain.depth >= self.config.max_depth {
                    report.max_depth_hits += 1;
                    report.approximate = true;
                    let best_trial = evaluation.best.unwrap_or(representative);
                    report.points.push(located(phase, best_trial));
                } else {
                    let observed = evaluation
                        .best
                        .as_ref()
                        .map_or(representative.driving_force, |p| p.driving_force);
                    let (left, right) = domain.bisect();
                    for child in [left, right] {
                        if child.intersects_domain(&reduced_blocks) {
                            next.push(Pending {
                                observed,
                                lower_bound: evaluation.lower_bound,
                                domain: child,
                            });
                        }
                    }
                }
            }

            if next.len() > self.config.max_frontier {
                // Rank by the lowest driving force actually seen in the parent, so
                // the box holding the incumbent always survives. Bounds only break
                // ties; the sort is stable, keeping bisection order after that.
                next.sort_by(|a, b| {
                    a.observed
                        .total_cmp(&b.observed)
                        .then(a.lower_bound.total_cmp(&b.lower_bound))
                });
                report.truncated += next.len() - self.config.max_frontier;
                report.approximate = true;
                next.truncate(self.config.max_frontier);
                debug!(kept = next.len(), "Frontier truncated to the lowest driving forces");
            }
            frontier = next.into_iter().map(|pending| pending.domain).collect();
        }

        let best_value = best.get();
        report.best = best_value.is_finite().then_some(best_value);
        debug!(
            evaluated = report.boxes_evaluated,
            pruned = report.pruned,
            accepted = report.accepted,
            max_depth_hits = report.max_depth_hits,
            points = report.points.len(),
            "Minima search finished"
        );
        Ok(report)
    }

    fn evaluate_box(
        &self,
        domain: &DomainBox,
        phase: &CandidatePhase,
        conditions: &ConditionSet,
        potentials: &[f64],
        best: &SharedMinimum,
    ) -> Result<BoxEvaluation, EquilibriumError> {
        let layout = phase.layout();
        let mut trials = Vec::new();
        let mut centroid_finite = false;
        for (i, reduced) in domain
            .trial_points(self.config.max_corner_dims)
            .into_iter()
            .enumerate()
        {
            let y = layout.to_site_fractions(&reduced);
            let Some(force) = phase.driving_force(&y, conditions, potentials)? else {
                continue;
            };
            if !force.value.is_finite() {
                continue;
            }
            if i == 0 {
                centroid_finite = true;
            }
            let gradient = layout.reduce_gradient(&force.gradient);
            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            best.fetch_min(force.value);
            trials.push(TrialPoint {
                reduced: layout.to_reduced(&y),
                driving_force: force.value,
                energy: force.energy,
                composition: force.composition,
                gradient_norm: if gradient_norm.is_finite() {
                    gradient_norm
                } else {
                    0.0
                },
                on_boundary: y.iter().any(|&v| v <= BOUNDARY_SITE_FRACTION),
            });
        }

        if trials.is_empty() {
            return Ok(BoxEvaluation {
                representative: None,
                best: None,
                lower_bound: f64::INFINITY,
            });
        }

        let has_interior = trials.iter().any(|p| !p.on_boundary);
        let steepest = trials
            .iter()
            .filter(|p| !has_interior || !p.on_boundary)
            .map(|p| p.gradient_norm)
            .fold(0.0, f64::max);
        let lipschitz = (self.config.lipschitz_factor * steepest).max(self.config.min_lipschitz);
        let best_index = trials
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.driving_force.total_cmp(&b.1.driving_force))
            .map_or(0, |(i, _)| i);
        let best_trial = trials[best_index].clone();
        let representative = if centroid_finite {
            trials.swap_remove(0)
        } else {
            best_trial.clone()
        };
        // Measured from the evaluated point: the full diameter for a corner
        // representative, the radius for an in-domain centroid.
        let lower_bound =
            representative.driving_force - lipschitz * domain.farthest_distance(&representative.reduced);

        Ok(BoxEvaluation {
            representative: Some(representative),
            best: Some(best_trial),
            lower_bound,
        })
    }
}

fn located(phase: &CandidatePhase, trial: TrialPoint) -> LocatedPoint {
    LocatedPoint {
        site_fractions: phase.layout().to_site_fractions(&trial.reduced),
        energy: trial.energy,
        composition: trial.composition,
        driving_force: trial.driving_force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::EnergyEvaluation;
    use crate::core::energy::potentials::{GAS_CONSTANT, y_ln_y, y_ln_y_derivative};
    use crate::core::models::phase::{PhaseDefinition, Sublattice};

    fn components(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn binary_conditions() -> ConditionSet {
        ConditionSet::new(1000.0, 1e5, &["A", "B"], &[("A", 0.5)]).unwrap()
    }

    const WELL_CENTRE: f64 = 0.3131;
    const WELL_WIDTH: f64 = 0.005;

    fn narrow_well(y: &[f64], _t: f64, _p: f64) -> EnergyEvaluation {
        let z = (y[0] - WELL_CENTRE) / WELL_WIDTH;
        let energy = -10.0 * (-z * z).exp();
        EnergyEvaluation::new(energy, vec![energy * -2.0 * z / WELL_WIDTH, 0.0])
    }

    #[test]
    fn bisect_splits_longest_edge_with_lowest_axis_on_ties() {
        let domain = DomainBox::unit(2);
        let (left, right) = domain.bisect();
        assert_eq!(left.upper, vec![0.5, 1.0]);
        assert_eq!(right.lower, vec![0.5, 0.0]);
        assert_eq!(left.depth, 1);

        let (lower, upper) = left.bisect();
        assert_eq!(lower.upper, vec![0.5, 0.5]);
        assert_eq!(upper.lower, vec![0.0, 0.5]);
    }

    #[test]
    fn boxes_outside_the_simplex_are_rejected() {
        let blocks = vec![0..2];
        let inside = DomainBox {
            lower: vec![0.25, 0.5],
            upper: vec![0.5, 0.75],
            depth: 2,
        };
        let outside = DomainBox {
            lower: vec![0.5, 0.75],
            upper: vec![1.0, 1.0],
            depth: 2,
        };
        assert!(inside.intersects_domain(&blocks));
        assert!(!outside.intersects_domain(&blocks));
    }

    #[test]
    fn trial_points_fall_back_to_face_centres_in_high_dimension() {
        let domain = DomainBox::unit(3);
        assert_eq!(domain.trial_points(3).len(), 1 + 8);
        assert_eq!(domain.trial_points(2).len(), 1 + 6);
        assert_eq!(domain.trial_points(2)[0], vec![0.5; 3]);
    }

    #[test]
    fn shared_minimum_only_decreases() {
        let minimum = SharedMinimum::new();
        assert_eq!(minimum.get(), f64::INFINITY);
        minimum.fetch_min(3.0);
        minimum.fetch_min(5.0);
        minimum.fetch_min(-1.5);
        assert_eq!(minimum.get(), -1.5);
    }

    #[test]
    fn locates_a_narrow_well_missed_by_coarse_sampling() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &narrow_well, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig::default();
        let report = RecursiveMinimaLocator::new(&config)
            .locate(&phase, &binary_conditions(), &[0.0, 0.0])
            .unwrap();

        assert!(!report.approximate);
        assert!(report.best.unwrap() < -9.9);
        assert!(
            report
                .points
                .iter()
                .any(|p| (p.site_fractions[0] - WELL_CENTRE).abs() < 1e-3),
            "no point near the well: {:?}",
            report.points
        );
        assert!(report.pruned > 0);
    }

    #[test]
    fn convex_phase_converges_to_single_tangent_point() {
        // G = (yA - 0.7)^2 against a flat plane: one minimum at yA = 0.7.
        let parabola = |y: &[f64], _t: f64, _p: f64| {
            let d = y[0] - 0.7;
            EnergyEvaluation::new(d * d, vec![2.0 * d, 0.0])
        };
        let definition = PhaseDefinition::new("FCC", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &parabola, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig {
            min_lipschitz: 0.1,
            ..RefinementConfig::default()
        };
        let report = RecursiveMinimaLocator::new(&config)
            .locate(&phase, &binary_conditions(), &[0.0, 0.0])
            .unwrap();

        assert!(!report.points.is_empty());
        for point in &report.points {
            assert!((point.site_fractions[0] - 0.7).abs() < 0.01);
            let sum: f64 = point.site_fractions.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn depth_limit_marks_result_approximate() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &narrow_well, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig {
            max_depth: 3,
            ..RefinementConfig::default()
        };
        let report = RecursiveMinimaLocator::new(&config)
            .locate(&phase, &binary_conditions(), &[0.0, 0.0])
            .unwrap();
        assert!(report.approximate);
        assert!(report.max_depth_hits > 0);
        assert!(!report.points.is_empty());
    }

    #[test]
    fn frontier_limit_marks_result_approximate() {
        let flat = |y: &[f64], _t: f64, _p: f64| EnergyEvaluation::constant(0.0, y.len());
        let definition =
            PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B", "C"])]);
        let phase = CandidatePhase::new(&definition, &flat, &components(&["A", "B", "C"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig {
            max_frontier: 16,
            resolution: 0.05,
            ..RefinementConfig::default()
        };
        let conditions =
            ConditionSet::new(1000.0, 1e5, &["A", "B", "C"], &[("A", 0.3), ("B", 0.3)]).unwrap();
        let report = RecursiveMinimaLocator::new(&config)
            .locate(&phase, &conditions, &[0.0, 0.0, 0.0])
            .unwrap();
        assert!(report.approximate);
        assert!(report.truncated > 0);
    }

    #[test]
    fn farthest_distance_is_radius_from_centroid_and_diameter_from_corner() {
        let domain = DomainBox {
            lower: vec![0.0, 0.25],
            upper: vec![0.5, 0.5],
            depth: 3,
        };
        assert!((domain.farthest_distance(&domain.centroid()) - domain.radius()).abs() < 1e-15);
        assert!((domain.farthest_distance(&[0.0, 0.25]) - domain.diameter()).abs() < 1e-15);
    }

    #[test]
    fn corner_representative_bounds_over_the_full_diameter() {
        // Undefined around the centroid, linear elsewhere.
        let holed = |y: &[f64], _t: f64, _p: f64| {
            if (y[0] - 0.5).abs() < 0.01 {
                EnergyEvaluation::new(f64::NAN, vec![f64::NAN, f64::NAN])
            } else {
                EnergyEvaluation::new(y[0], vec![1.0, 0.0])
            }
        };
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &holed, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig::default();
        let locator = RecursiveMinimaLocator::new(&config);

        let evaluation = locator
            .evaluate_box(
                &DomainBox::unit(1),
                &phase,
                &binary_conditions(),
                &[0.0, 0.0],
                &SharedMinimum::new(),
            )
            .unwrap();

        let representative = evaluation.representative.unwrap();
        assert_eq!(representative.reduced, vec![0.0]);
        // L = min_lipschitz; the far corner is one full diameter away.
        assert!((evaluation.lower_bound - (0.0 - config.min_lipschitz * 1.0)).abs() < 1e-12);
    }

    #[test]
    fn boundary_points_do_not_inflate_the_lipschitz_estimate() {
        let ideal = |y: &[f64], t: f64, _p: f64| {
            let rt = GAS_CONSTANT * t;
            EnergyEvaluation::new(
                rt * (y_ln_y(y[0]) + y_ln_y(y[1])),
                vec![rt * y_ln_y_derivative(y[0]), rt * y_ln_y_derivative(y[1])],
            )
        };
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &ideal, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig::default();
        let domain = DomainBox {
            lower: vec![0.0],
            upper: vec![0.5],
            depth: 1,
        };

        let evaluation = RecursiveMinimaLocator::new(&config)
            .evaluate_box(&domain, &phase, &binary_conditions(), &[0.0, 0.0], &SharedMinimum::new())
            .unwrap();

        // Interior trial points are the centroid (0.25) and the corner at 0.5, where
        // the reduced gradient vanishes; the corner at 0 lies on the boundary.
        let rt = GAS_CONSTANT * 1000.0;
        let f_centroid = rt * (0.25f64 * 0.25f64.ln() + 0.75f64 * 0.75f64.ln());
        let lipschitz = config.lipschitz_factor * rt * (3.0f64).ln();
        let expected = f_centroid - lipschitz * 0.25;
        assert!(
            (evaluation.lower_bound - expected).abs() < 1e-6 * expected.abs(),
            "bound {} expected {expected}",
            evaluation.lower_bound
        );
    }

    #[test]
    fn truncated_frontier_keeps_the_box_holding_the_incumbent() {
        // Minimum at yA = 0.25; steep but higher ground on the right half gives
        // those boxes the most negative Lipschitz bounds.
        let tilted = |y: &[f64], _t: f64, _p: f64| {
            let d = y[0] - 0.25;
            let steep = (y[0] - 0.5).max(0.0);
            EnergyEvaluation::new(
                50.0 * d * d + 400.0 * steep * steep,
                vec![100.0 * d + 800.0 * steep, 0.0],
            )
        };
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &tilted, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig {
            max_frontier: 2,
            ..RefinementConfig::default()
        };

        let report = RecursiveMinimaLocator::new(&config)
            .locate(&phase, &binary_conditions(), &[0.0, 0.0])
            .unwrap();

        assert!(report.truncated > 0);
        assert!(report.approximate);
        assert_eq!(report.best, Some(0.0));
        assert!(!report.points.is_empty());
        for point in &report.points {
            assert!(
                (point.site_fractions[0] - 0.25).abs() < 0.01,
                "point away from the minimum: {point:?}"
            );
        }
    }

    #[test]
    fn cancelled_token_stops_the_search() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &narrow_well, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = RefinementConfig::default();
        let token = CancellationToken::new();
        token.cancel();
        let result = RecursiveMinimaLocator::new(&config)
            .with_cancellation(Some(&token))
            .locate(&phase, &binary_conditions(), &[0.0, 0.0]);
        assert!(matches!(result, Err(EquilibriumError::Cancelled)));
    }
}
