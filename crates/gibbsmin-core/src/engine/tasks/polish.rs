use crate::core::models::conditions::ConditionSet;
use crate::core::utils::simplex::project_onto_simplex;
use crate::engine::config::PolishConfig;
use crate::engine::context::{CandidatePhase, DrivingForce};
use crate::engine::error::EquilibriumError;
use tracing::trace;

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO: f64 = 1e-4;
const INITIAL_STEP: f64 = 0.1;
const MIN_STEP: f64 = 1e-14;
/// Moves shorter than this (max-norm) end the descent.
const MIN_MOVE: f64 = 1e-12;

/// Result of polishing one facet vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct PolishedPoint {
    pub site_fractions: Vec<f64>,
    pub energy: f64,
    pub composition: Vec<f64>,
    pub driving_force: f64,
    pub iterations: usize,
    /// Max-norm distance from the starting constitution.
    pub displacement: f64,
}

/// Local descent of the driving force against a fixed tangent plane.
///
/// Projected gradient steps on the active site fractions with Armijo
/// backtracking; every sublattice block is projected back onto its simplex
/// after each step.
pub struct TangentPlanePolisher<'a> {
    config: &'a PolishConfig,
}

impl<'a> TangentPlanePolisher<'a> {
    pub fn new(config: &'a PolishConfig) -> Self {
        Self { config }
    }

    /// Polishes `start`; `None` for stoichiometric phases or when the starting
    /// constitution has no finite driving force.
    pub fn polish(
        &self,
        phase: &CandidatePhase,
        start: &[f64],
        conditions: &ConditionSet,
        potentials: &[f64],
    ) -> Result<Option<PolishedPoint>, EquilibriumError> {
        if !phase.is_solution() {
            return Ok(None);
        }
        let Some(mut current) = phase.driving_force(start, conditions, potentials)? else {
            return Ok(None);
        };
        let blocks = phase.layout().blocks();
        let mut y = start.to_vec();
        let mut step = INITIAL_STEP;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut accepted: Option<(Vec<f64>, DrivingForce)> = None;
            while step >= MIN_STEP {
                let mut trial: Vec<f64> = y
                    .iter()
                    .zip(&current.gradient)
                    .map(|(v, g)| v - step * g)
                    .collect();
                for block in blocks {
                    project_onto_simplex(&mut trial[block.clone()]);
                }
                let decrease: f64 = current
                    .gradient
                    .iter()
                    .zip(trial.iter().zip(&y))
                    .map(|(g, (t, v))| g * (t - v))
                    .sum();
                if let Some(force) = phase.driving_force(&trial, conditions, potentials)? {
                    if force.value <= current.value + ARMIJO * decrease {
                        accepted = Some((trial, force));
                        break;
                    }
                }
                step *= 0.5;
            }

            let Some((next, force)) = accepted else {
                break;
            };
            let moved = max_distance(&next, &y);
            let gain = current.value - force.value;
            y = next;
            current = force;
            step = (step * 2.0).min(1.0);
            if moved < MIN_MOVE || gain < self.config.energy_tolerance * 1e-3 {
                break;
            }
        }

        let displacement = max_distance(&y, start);
        trace!(
            phase = phase.name(),
            iterations,
            displacement,
            driving_force = current.value,
            "Polished facet vertex"
        );
        Ok(Some(PolishedPoint {
            site_fractions: y,
            energy: current.energy,
            composition: current.composition,
            driving_force: current.value,
            iterations,
            displacement,
        }))
    }
}

fn max_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::EnergyEvaluation;
    use crate::core::models::phase::{PhaseDefinition, Sublattice};

    fn components(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn parabola(y: &[f64], _t: f64, _p: f64) -> EnergyEvaluation {
        let d = y[0] - 0.7;
        EnergyEvaluation::new(d * d, vec![2.0 * d, 0.0])
    }

    fn conditions(names: &[&str]) -> ConditionSet {
        ConditionSet::new(1000.0, 1e5, names, &[(names[0], 0.5)]).unwrap()
    }

    #[test]
    fn descends_to_the_tangent_point() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &parabola, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = PolishConfig::default();
        let polished = TangentPlanePolisher::new(&config)
            .polish(&phase, &[0.2, 0.8], &conditions(&["A", "B"]), &[0.0, 0.0])
            .unwrap()
            .unwrap();

        assert!((polished.site_fractions[0] - 0.7).abs() < 1e-4);
        assert!((polished.site_fractions.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(polished.driving_force < 1e-8);
        assert!(polished.displacement > 0.4);
    }

    #[test]
    fn stays_on_the_simplex_when_the_minimum_is_outside() {
        // G = 3 yA, minimised at the B corner.
        let linear = |y: &[f64], _t: f64, _p: f64| {
            EnergyEvaluation::new(3.0 * y[0], vec![3.0, 0.0, 0.0])
        };
        let definition =
            PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B", "C"])]);
        let phase = CandidatePhase::new(&definition, &linear, &components(&["A", "B", "C"]))
            .unwrap()
            .unwrap();
        let config = PolishConfig::default();
        let polished = TangentPlanePolisher::new(&config)
            .polish(
                &phase,
                &[0.4, 0.3, 0.3],
                &conditions(&["A", "B", "C"]),
                &[0.0, 0.0, 0.0],
            )
            .unwrap()
            .unwrap();

        assert!(polished.site_fractions.iter().all(|&v| v >= 0.0));
        assert!((polished.site_fractions.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(polished.site_fractions[0] < 1e-9);
        assert!(polished.driving_force < 1e-8);
    }

    #[test]
    fn stoichiometric_phases_are_not_polished() {
        let definition = PhaseDefinition::new("AB", vec![Sublattice::new(1.0, &["A"]), Sublattice::new(1.0, &["B"])]);
        let flat = |y: &[f64], _t: f64, _p: f64| EnergyEvaluation::constant(0.0, y.len());
        let phase = CandidatePhase::new(&definition, &flat, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = PolishConfig::default();
        let result = TangentPlanePolisher::new(&config)
            .polish(&phase, &[1.0, 1.0], &conditions(&["A", "B"]), &[0.0, 0.0])
            .unwrap();
        assert!(result.is_none());
    }
}
