use crate::core::database::Database;
use crate::core::models::composition_set::CompositionSet;
use crate::core::models::conditions::ConditionSet;
use crate::core::utils::simplex::normalize_blocks;
use crate::engine::config::{EquilibriumConfig, HullConfig, RefinementPolicy};
use crate::engine::context::{CandidatePhase, EquilibriumContext, resolve_candidate_phases};
use crate::engine::error::EquilibriumError;
use crate::engine::points::{CandidatePoint, PointOrigin, PointStore};
use crate::engine::progress::{CancellationToken, Progress, ProgressReporter};
use crate::engine::state::{Diagnostics, SolverState};
use crate::engine::tasks;
use crate::engine::tasks::lower_hull::{HullSolution, LowerHullSolver};
use crate::engine::tasks::minima_locator::RecursiveMinimaLocator;
use crate::engine::tasks::polish::TangentPlanePolisher;
use crate::engine::utils::curvature::min_exchange_curvature;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Polished points closer than this (max-norm) to their start are not added.
const MIN_POLISH_DISPLACEMENT: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumResult {
    pub conditions: ConditionSet,
    /// Molar Gibbs energy of the system at the target composition.
    pub total_energy: f64,
    /// Stable phase instances, ordered by phase name and then by label.
    pub composition_sets: Vec<CompositionSet>,
    /// Chemical potential of each component, in condition component order.
    pub chemical_potentials: Vec<f64>,
    /// Set when a search limit was hit and a missed minimum cannot be excluded.
    pub approximate: bool,
    pub diagnostics: Diagnostics,
}

impl EquilibriumResult {
    pub fn chemical_potential(&self, component: &str) -> Option<f64> {
        self.conditions
            .components()
            .iter()
            .position(|c| c == component)
            .map(|i| self.chemical_potentials[i])
    }

    pub fn composition_set(&self, label: &str) -> Option<&CompositionSet> {
        self.composition_sets.iter().find(|set| set.label == label)
    }

    /// Labels of the stable composition sets.
    pub fn stable_labels(&self) -> Vec<&str> {
        self.composition_sets
            .iter()
            .map(|set| set.label.as_str())
            .collect()
    }
}

/// Global equilibrium of `phase_names` (all database phases when empty) under
/// `conditions`.
///
/// The result is built from scratch on every call; an error leaves nothing
/// behind.
#[instrument(skip_all, name = "equilibrium_workflow")]
pub fn run<D>(
    database: &D,
    conditions: &ConditionSet,
    phase_names: &[&str],
    config: &EquilibriumConfig,
    reporter: &ProgressReporter,
    cancellation: Option<&CancellationToken>,
) -> Result<EquilibriumResult, EquilibriumError>
where
    D: Database + ?Sized,
{
    // === Stage 0: Preparation ===
    reporter.report(Progress::StageStart {
        name: "Preparation",
    });
    config.validate()?;
    let context = EquilibriumContext::new(conditions, config, reporter, cancellation);
    let phases = resolve_candidate_phases(database, conditions, phase_names)?;
    if phases.is_empty() {
        return Err(EquilibriumError::InfeasibleConditions {
            reason: "no candidate phase can form from the given components".to_string(),
            bracket: Vec::new(),
        });
    }
    let names: Vec<&str> = phases.iter().map(CandidatePhase::name).collect();
    info!(
        temperature = conditions.temperature(),
        phases = phases.len(),
        components = conditions.component_count(),
        "Starting equilibrium calculation."
    );
    reporter.report(Progress::StageFinish);

    // === Stage 1: Sampling ===
    reporter.report(Progress::StageStart { name: "Sampling" });
    let sampled = tasks::sampling::run(&context, &phases)?;
    let mut store = PointStore::new(phases.len(), config.refinement.resolution);
    for (phase, points) in sampled.into_iter().enumerate() {
        for point in points {
            store.push(CandidatePoint {
                phase,
                site_fractions: point.site_fractions,
                energy: point.energy,
                composition: point.composition,
                origin: PointOrigin::Sampled,
            });
        }
    }
    reporter.report(Progress::StageFinish);

    // === Stage 2: Initial hull ===
    context.check_cancelled()?;
    reporter.report(Progress::StageStart { name: "Lower Hull" });
    let solver = LowerHullSolver::new(&config.hull);
    let hull = solver.solve(&store, &names, conditions)?;
    info!(
        energy = hull.energy,
        vertices = hull.vertices.len(),
        "Initial hull solved."
    );
    let mut state = SolverState::new(store, hull);
    reporter.report(Progress::StageFinish);

    // === Stage 3: Refinement ===
    refine(&mut state, &phases, &names, &context, &solver)?;

    // === Stage 4: Polishing ===
    if config.polish.enabled {
        polish(&mut state, &phases, &names, &context, &solver)?;
    }

    // === Stage 5: Assembly ===
    reporter.report(Progress::StageStart { name: "Assembly" });
    state.sync_point_counts();
    let composition_sets =
        assemble_composition_sets(&state, &phases, conditions, &config.hull)?;
    let result = EquilibriumResult {
        conditions: conditions.clone(),
        total_energy: state.energy(),
        composition_sets,
        chemical_potentials: state.potentials().to_vec(),
        approximate: state.approximate,
        diagnostics: state.diagnostics.clone(),
    };
    reporter.report(Progress::StageFinish);

    if result.approximate {
        warn!("Search limits were reached; the result may have missed a minimum.");
    }
    info!(
        energy = result.total_energy,
        stable = ?result.stable_labels(),
        "Equilibrium calculation complete."
    );
    Ok(result)
}

/// Phases whose driving-force landscape should be searched under `policy`.
fn refinement_targets(
    state: &SolverState,
    phases: &[CandidatePhase],
    context: &EquilibriumContext,
) -> Result<Vec<usize>, EquilibriumError> {
    let (dof_threshold, curvature_threshold) = match context.config.refinement.policy {
        RefinementPolicy::Never => return Ok(Vec::new()),
        RefinementPolicy::Always => {
            return Ok((0..phases.len())
                .filter(|&i| phases[i].is_solution())
                .collect());
        }
        RefinementPolicy::Auto {
            dof_threshold,
            curvature_threshold,
        } => (dof_threshold, curvature_threshold),
    };

    let mut facet_counts = vec![0usize; phases.len()];
    for (point, _) in state.facet() {
        facet_counts[point.phase] += 1;
    }

    let mut targets = Vec::new();
    for (i, phase) in phases.iter().enumerate() {
        if !phase.is_solution() {
            continue;
        }
        if phase.degrees_of_freedom() >= dof_threshold || facet_counts[i] >= 2 {
            targets.push(i);
            continue;
        }
        for (point, _) in state.facet().filter(|(p, _)| p.phase == i) {
            let curvature = min_exchange_curvature(
                phase,
                &point.site_fractions,
                context.conditions.temperature(),
                context.conditions.pressure(),
            )?;
            if curvature.is_some_and(|c| c < -curvature_threshold) {
                debug!(phase = phase.name(), ?curvature, "Negative curvature on facet vertex");
                targets.push(i);
                break;
            }
        }
    }
    Ok(targets)
}

fn refine(
    state: &mut SolverState,
    phases: &[CandidatePhase],
    names: &[&str],
    context: &EquilibriumContext,
    solver: &LowerHullSolver,
) -> Result<(), EquilibriumError> {
    let config = &context.config.refinement;
    context.reporter.report(Progress::StageStart { name: "Refinement" });
    let locator = RecursiveMinimaLocator::new(config).with_cancellation(context.cancellation);

    for round in 0..config.max_rounds {
        context.check_cancelled()?;
        let targets = refinement_targets(state, phases, context)?;
        if targets.is_empty() {
            debug!(round, "No phase needs refinement");
            break;
        }

        context.reporter.report(Progress::TaskStart {
            total_steps: targets.len() as u64,
        });
        let potentials = state.potentials().to_vec();
        let mut added = 0;
        for &i in &targets {
            let report = locator.locate(&phases[i], context.conditions, &potentials)?;
            state.record_locator(&report);
            for point in report.points {
                let inserted = state.store.push_if_distinct(CandidatePoint {
                    phase: i,
                    site_fractions: point.site_fractions,
                    energy: point.energy,
                    composition: point.composition,
                    origin: PointOrigin::Refined,
                });
                added += usize::from(inserted.is_some());
            }
            context.reporter.report(Progress::TaskIncrement);
        }
        context.reporter.report(Progress::TaskFinish);
        state.diagnostics.refinement_rounds += 1;

        if added == 0 {
            debug!(round, "Refinement found no new points");
            break;
        }
        let decrease = resolve(state, solver, names, context.conditions)?;
        info!(round, added, decrease, energy = state.energy(), "Refinement round finished.");
        if decrease < context.config.polish.energy_tolerance {
            break;
        }
    }

    context.reporter.report(Progress::StageFinish);
    Ok(())
}

fn polish(
    state: &mut SolverState,
    phases: &[CandidatePhase],
    names: &[&str],
    context: &EquilibriumContext,
    solver: &LowerHullSolver,
) -> Result<(), EquilibriumError> {
    let config = &context.config.polish;
    context.reporter.report(Progress::StageStart { name: "Polishing" });
    let polisher = TangentPlanePolisher::new(config);

    for round in 0..config.max_rounds {
        context.check_cancelled()?;
        let potentials = state.potentials().to_vec();
        let starts: Vec<(usize, Vec<f64>, f64)> = state
            .facet()
            .map(|(point, _)| {
                let plane: f64 = point
                    .composition
                    .iter()
                    .zip(&potentials)
                    .map(|(x, mu)| x * mu)
                    .sum();
                (point.phase, point.site_fractions.clone(), point.energy - plane)
            })
            .collect();

        let mut added = 0;
        for (i, start, start_force) in starts {
            let Some(polished) =
                polisher.polish(&phases[i], &start, context.conditions, &potentials)?
            else {
                continue;
            };
            if polished.displacement > MIN_POLISH_DISPLACEMENT && polished.driving_force < start_force {
                state.store.push(CandidatePoint {
                    phase: i,
                    site_fractions: polished.site_fractions,
                    energy: polished.energy,
                    composition: polished.composition,
                    origin: PointOrigin::Polished,
                });
                added += 1;
            }
        }
        state.diagnostics.polish_rounds += 1;
        if added == 0 {
            break;
        }
        let decrease = resolve(state, solver, names, context.conditions)?;
        debug!(round, added, decrease, "Polishing round finished");
        if decrease < config.energy_tolerance {
            break;
        }
    }

    context.reporter.report(Progress::StageFinish);
    Ok(())
}

fn resolve(
    state: &mut SolverState,
    solver: &LowerHullSolver,
    names: &[&str],
    conditions: &ConditionSet,
) -> Result<f64, EquilibriumError> {
    let hull: HullSolution = solver.solve(&state.store, names, conditions)?;
    Ok(state.update_hull(hull))
}

struct Cluster {
    phase: usize,
    weight: f64,
    site_fractions: Vec<f64>,
    energy: f64,
}

impl Cluster {
    fn is_near(&self, point: &CandidatePoint, merge_distance: f64) -> bool {
        self.phase == point.phase
            && self
                .site_fractions
                .iter()
                .zip(&point.site_fractions)
                .all(|(a, b)| (a - b).abs() < merge_distance)
    }

    /// Fraction-weighted mean constitution after absorbing `point`.
    fn merged_with(&self, point: &CandidatePoint, weight: f64) -> Vec<f64> {
        let total = self.weight + weight;
        self.site_fractions
            .iter()
            .zip(&point.site_fractions)
            .map(|(mean, y)| (mean * self.weight + y * weight) / total)
            .collect()
    }
}

/// Whether the constitution `y` of `phase` lies on (or below) the tangent plane.
/// The mean of two vertices straddling an unstable region lies above it.
fn lies_on_plane(
    phase: &CandidatePhase,
    y: &[f64],
    conditions: &ConditionSet,
    potentials: &[f64],
    tolerance: f64,
) -> Result<bool, EquilibriumError> {
    let force = phase.driving_force(y, conditions, potentials)?;
    Ok(force.is_some_and(|f| f.value <= tolerance))
}

/// Groups same-phase facet vertices lying within `merge_distance` of each other
/// into composition sets. Merged constitutions are fraction-weighted means, and
/// a merge only happens while that mean stays on the tangent plane.
fn assemble_composition_sets(
    state: &SolverState,
    phases: &[CandidatePhase],
    conditions: &ConditionSet,
    config: &HullConfig,
) -> Result<Vec<CompositionSet>, EquilibriumError> {
    let potentials = state.potentials();
    let tolerance = config.epsilon * (1.0 + state.energy().abs());
    let mut clusters: Vec<Cluster> = Vec::new();
    for (point, weight) in state.facet() {
        let phase = &phases[point.phase];
        let mut merged = None;
        for (index, cluster) in clusters.iter().enumerate() {
            if !cluster.is_near(point, config.merge_distance) {
                continue;
            }
            let mut mean = cluster.merged_with(point, weight);
            normalize_blocks(&mut mean, phase.layout().blocks());
            if lies_on_plane(phase, &mean, conditions, potentials, tolerance)? {
                merged = Some((index, mean));
                break;
            }
            debug!(
                phase = phase.name(),
                "Nearby facet vertices straddle an unstable region, keeping them apart"
            );
        }
        match merged {
            Some((index, mean)) => {
                let cluster = &mut clusters[index];
                let total = cluster.weight + weight;
                cluster.energy = (cluster.energy * cluster.weight + point.energy * weight) / total;
                cluster.site_fractions = mean;
                cluster.weight = total;
            }
            None => clusters.push(Cluster {
                phase: point.phase,
                weight,
                site_fractions: point.site_fractions.clone(),
                energy: point.energy,
            }),
        }
    }
    // Stable: sets of one phase stay in point-id order.
    clusters.sort_by(|a, b| phases[a.phase].name().cmp(phases[b.phase].name()));

    let mut per_phase: BTreeMap<&str, usize> = BTreeMap::new();
    for cluster in &clusters {
        *per_phase.entry(phases[cluster.phase].name()).or_default() += 1;
    }
    let fractions = unit_sum_fractions(clusters.iter().map(|c| c.weight).collect());

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut sets = Vec::with_capacity(clusters.len());
    for (cluster, fraction) in clusters.into_iter().zip(fractions) {
        let phase = &phases[cluster.phase];
        let name = phase.name();
        let index = seen.entry(name).or_default();
        *index += 1;
        let label = if per_phase.get(name).is_some_and(|&count| count > 1) {
            format!("{name}#{index}")
        } else {
            name.to_string()
        };

        let mut y = cluster.site_fractions;
        normalize_blocks(&mut y, phase.layout().blocks());
        let composition = phase
            .composition(&y)
            .ok_or_else(|| EquilibriumError::EnergyEvaluation {
                phase: name.to_string(),
                reason: "stable constitution holds no atoms".to_string(),
            })?;
        let evaluation = phase.evaluate(&y, conditions.temperature(), conditions.pressure())?;
        let energy = if evaluation.energy.is_finite() {
            evaluation.energy
        } else {
            cluster.energy
        };

        sets.push(CompositionSet::new(
            phase.definition(),
            label,
            phase.layout().expand(&y),
            fraction,
            composition,
            energy,
        ));
    }
    Ok(sets)
}

/// Normalises `weights` to sum to one, absorbing the rounding remainder into
/// the largest entry.
fn unit_sum_fractions(mut weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return weights;
    }
    weights.iter_mut().for_each(|w| *w /= total);
    if let Some(largest) = (0..weights.len()).max_by(|&a, &b| weights[a].total_cmp(&weights[b])) {
        let others: f64 = weights
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != largest)
            .map(|(_, w)| w)
            .sum();
        weights[largest] = 1.0 - others;
    }
    weights
}
