use crate::core::models::conditions::ConditionSet;
use crate::core::utils::simplex::{block_product, grid_size, random_simplex_point, simplex_grid};
use crate::engine::config::SamplingConfig;
use crate::engine::context::{CandidatePhase, EquilibriumContext};
use crate::engine::error::EquilibriumError;
use crate::engine::progress::Progress;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Largest grid refinement exponent tried (2^MAX_GRID_EXPONENT subdivisions).
const MAX_GRID_EXPONENT: u32 = 20;

/// One sampled constitution with its energy and overall composition.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPoint {
    pub site_fractions: Vec<f64>,
    pub energy: f64,
    pub composition: Vec<f64>,
}

/// Generates space-filling occupancy points for a phase and evaluates them.
///
/// The point set for a given density is deterministic and a subset of the
/// point set for any higher density: endmembers, then a power-of-two simplex
/// grid, then a seeded stream of random points.
pub struct DegreeOfFreedomSampler<'a> {
    config: &'a SamplingConfig,
}

impl<'a> DegreeOfFreedomSampler<'a> {
    pub fn new(config: &'a SamplingConfig) -> Self {
        Self { config }
    }

    /// Samples a phase, retrying once at double density if too few usable
    /// points (fewer than `dof + 1`) come back.
    #[instrument(skip_all, name = "dof_sampler", fields(phase = phase.name()))]
    pub fn sample(
        &self,
        phase: &CandidatePhase,
        conditions: &ConditionSet,
    ) -> Result<Vec<SampledPoint>, EquilibriumError> {
        let required = phase.degrees_of_freedom() + 1;
        let batch = self.evaluate_points(phase, conditions, self.config.density)?;
        if batch.points.len() >= required {
            debug!(points = batch.points.len(), "Sampled phase");
            return Ok(batch.points);
        }

        let retry_density = self.config.density.saturating_mul(2);
        warn!(
            found = batch.points.len(),
            required,
            retry_density,
            "Too few usable sample points, retrying at higher density"
        );
        let batch = self.evaluate_points(phase, conditions, retry_density)?;
        if batch.points.len() >= required {
            Ok(batch.points)
        } else {
            Err(EquilibriumError::InsufficientSamples {
                phase: phase.name().to_string(),
                found: batch.points.len(),
                required,
            })
        }
    }

    /// The unevaluated occupancy points (active coordinates) for `density`.
    pub fn occupancies(&self, phase: &CandidatePhase, density: usize) -> Vec<Vec<f64>> {
        let mut points = phase.endmembers();
        let dof = phase.degrees_of_freedom();
        if dof == 0 {
            points.truncate(1);
            return points;
        }

        let block_lens: Vec<usize> = phase.layout().blocks().iter().map(|b| b.len()).collect();
        let target = density.saturating_mul(dof) as f64;
        let budget = self.config.grid_budget_factor * target;

        let exponent = (1..=MAX_GRID_EXPONENT)
            .take_while(|&k| {
                let size = block_lens
                    .iter()
                    .map(|&len| grid_size(len, 1usize << k) as f64)
                    .product::<f64>();
                size <= budget
            })
            .last();
        if let Some(k) = exponent {
            let per_block: Vec<Vec<Vec<f64>>> = block_lens
                .iter()
                .map(|&len| simplex_grid(len, 1usize << k))
                .collect();
            points.extend(
                block_product(&per_block)
                    .into_iter()
                    .filter(|p| !is_endmember(p)),
            );
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed ^ name_seed(phase.name()));
        for _ in 0..density.saturating_mul(dof) {
            let point = block_lens
                .iter()
                .flat_map(|&len| random_simplex_point(len, &mut rng))
                .collect();
            points.push(point);
        }
        points
    }

    fn evaluate_points(
        &self,
        phase: &CandidatePhase,
        conditions: &ConditionSet,
        density: usize,
    ) -> Result<SampleBatch, EquilibriumError> {
        let mut batch = SampleBatch::default();
        for y in self.occupancies(phase, density) {
            let Some(composition) = phase.composition(&y) else {
                batch.undefined_composition += 1;
                continue;
            };
            let evaluation = phase.evaluate(&y, conditions.temperature(), conditions.pressure())?;
            if !evaluation.energy.is_finite() {
                batch.non_finite_energy += 1;
                continue;
            }
            batch.points.push(SampledPoint {
                site_fractions: y,
                energy: evaluation.energy,
                composition,
            });
        }

        if batch.non_finite_energy > 0 {
            warn!(
                dropped = batch.non_finite_energy,
                density, "Dropped sample points with a non-finite energy"
            );
        }
        if batch.undefined_composition > 0 {
            debug!(
                dropped = batch.undefined_composition,
                density, "Dropped sample points holding no atoms"
            );
        }
        Ok(batch)
    }
}

/// Evaluated points of one sampling pass, with what had to be left out.
#[derive(Debug, Default)]
struct SampleBatch {
    points: Vec<SampledPoint>,
    undefined_composition: usize,
    non_finite_energy: usize,
}

fn is_endmember(point: &[f64]) -> bool {
    point.iter().all(|&v| v == 0.0 || v == 1.0)
}

/// FNV-1a hash of a phase name, so each phase draws its own random stream.
fn name_seed(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Samples every phase, checking for cancellation before each one.
#[instrument(skip_all, name = "sampling_task")]
pub fn run(
    context: &EquilibriumContext,
    phases: &[CandidatePhase],
) -> Result<Vec<Vec<SampledPoint>>, EquilibriumError> {
    context.reporter.report(Progress::TaskStart {
        total_steps: phases.len() as u64,
    });
    let sampler = DegreeOfFreedomSampler::new(&context.config.sampling);

    let sample_one = |phase: &CandidatePhase| {
        context.check_cancelled()?;
        let points = sampler.sample(phase, context.conditions);
        context.reporter.report(Progress::TaskIncrement);
        points
    };

    #[cfg(not(feature = "parallel"))]
    let results: Result<Vec<_>, _> = phases.iter().map(sample_one).collect();
    #[cfg(feature = "parallel")]
    let results: Result<Vec<_>, _> = phases.par_iter().map(sample_one).collect();

    context.reporter.report(Progress::TaskFinish);
    let results = results?;
    info!(
        phases = phases.len(),
        points = results.iter().map(Vec::len).sum::<usize>(),
        "Sampling complete"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::EnergyEvaluation;
    use crate::core::models::phase::{PhaseDefinition, Sublattice};

    fn components(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn quadratic(y: &[f64], _t: f64, _p: f64) -> EnergyEvaluation {
        EnergyEvaluation::new(
            y.iter().map(|v| v * v).sum(),
            y.iter().map(|v| 2.0 * v).collect(),
        )
    }

    fn conditions() -> ConditionSet {
        ConditionSet::new(1000.0, 1e5, &["A", "B", "C"], &[("A", 0.3), ("B", 0.3)]).unwrap()
    }

    #[test]
    fn stoichiometric_phase_yields_exactly_one_point() {
        let definition = PhaseDefinition::new(
            "AB2",
            vec![Sublattice::new(1.0, &["A"]), Sublattice::new(2.0, &["B"])],
        );
        let phase = CandidatePhase::new(&definition, &quadratic, &components(&["A", "B", "C"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let points = DegreeOfFreedomSampler::new(&config)
            .sample(&phase, &conditions())
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].site_fractions, vec![1.0, 1.0]);
        assert!((points[0].energy - 2.0).abs() < 1e-12);
        assert!((points[0].composition[0] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn samples_include_endmembers_and_respect_block_sums() {
        let definition = PhaseDefinition::new(
            "SPINEL",
            vec![
                Sublattice::new(1.0, &["A", "B", "C"]),
                Sublattice::new(2.0, &["A", "B"]),
            ],
        );
        let phase = CandidatePhase::new(&definition, &quadratic, &components(&["A", "B", "C"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let points = DegreeOfFreedomSampler::new(&config)
            .sample(&phase, &conditions())
            .unwrap();

        for endmember in phase.endmembers() {
            assert!(points.iter().any(|p| p.site_fractions == endmember));
        }
        for point in &points {
            for block in phase.layout().blocks() {
                let sum: f64 = point.site_fractions[block.clone()].iter().sum();
                assert!((sum - 1.0).abs() < 1e-12);
            }
        }
        assert!(points.len() >= config.density * phase.degrees_of_freedom());
    }

    #[test]
    fn higher_density_point_set_contains_lower_density_set() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B", "C"])]);
        let phase = CandidatePhase::new(&definition, &quadratic, &components(&["A", "B", "C"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let sampler = DegreeOfFreedomSampler::new(&config);
        let coarse = sampler.occupancies(&phase, 5);
        let fine = sampler.occupancies(&phase, 10);
        for point in &coarse {
            assert!(fine.contains(point), "missing {point:?}");
        }
    }

    #[test]
    fn sampling_is_deterministic_for_a_seed() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &quadratic, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let sampler = DegreeOfFreedomSampler::new(&config);
        assert_eq!(sampler.occupancies(&phase, 20), sampler.occupancies(&phase, 20));
    }

    #[test]
    fn non_finite_energies_are_dropped_and_reported_as_insufficient() {
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let broken = |y: &[f64], _t: f64, _p: f64| EnergyEvaluation::constant(f64::NAN, y.len());
        let phase = CandidatePhase::new(&definition, &broken, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let result = DegreeOfFreedomSampler::new(&config).sample(&phase, &conditions());
        assert!(matches!(
            result,
            Err(EquilibriumError::InsufficientSamples { found: 0, required: 2, .. })
        ));
    }

    #[test]
    fn dropped_points_are_counted_by_reason() {
        let definition = PhaseDefinition::new("GAS", vec![Sublattice::new(1.0, &["A", "VA"])]);
        // Infinite for A-rich points, undefined composition for pure vacancy.
        let steep = |y: &[f64], _t: f64, _p: f64| {
            let energy = if y[0] > 0.75 { f64::INFINITY } else { y[0] };
            EnergyEvaluation::new(energy, vec![1.0, 0.0])
        };
        let phase = CandidatePhase::new(&definition, &steep, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let sampler = DegreeOfFreedomSampler::new(&config);

        let batch = sampler
            .evaluate_points(&phase, &conditions(), config.density)
            .unwrap();

        let total = sampler.occupancies(&phase, config.density).len();
        assert_eq!(batch.undefined_composition, 1);
        assert!(batch.non_finite_energy > 0);
        assert_eq!(
            batch.points.len() + batch.undefined_composition + batch.non_finite_energy,
            total
        );
        assert!(batch.points.iter().all(|p| p.energy.is_finite()));
    }

    #[test]
    fn retry_at_double_density_recovers_a_sparse_phase() {
        // Finite only at the pure-A endmember and at the equimolar grid point,
        // which the grid reaches only from density 2.
        let sparse = |y: &[f64], _t: f64, _p: f64| {
            let energy = if y[0] == 1.0 || y[0] == 0.5 { -y[0] } else { f64::NAN };
            EnergyEvaluation::new(energy, vec![-1.0, 0.0])
        };
        let definition = PhaseDefinition::new("LIQ", vec![Sublattice::new(1.0, &["A", "B"])]);
        let phase = CandidatePhase::new(&definition, &sparse, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig {
            density: 1,
            ..SamplingConfig::default()
        };
        let sampler = DegreeOfFreedomSampler::new(&config);
        assert_eq!(
            sampler
                .evaluate_points(&phase, &conditions(), 1)
                .unwrap()
                .points
                .len(),
            1
        );

        let points = sampler.sample(&phase, &conditions()).unwrap();

        assert_eq!(points.len(), 2);
        assert!(points.iter().any(|p| p.site_fractions == vec![0.5, 0.5]));
        assert!(points.iter().any(|p| p.site_fractions == vec![1.0, 0.0]));
    }

    #[test]
    fn vacancy_rich_points_with_undefined_composition_are_dropped() {
        let definition = PhaseDefinition::new("GAS", vec![Sublattice::new(1.0, &["A", "VA"])]);
        let phase = CandidatePhase::new(&definition, &quadratic, &components(&["A", "B"]))
            .unwrap()
            .unwrap();
        let config = SamplingConfig::default();
        let points = DegreeOfFreedomSampler::new(&config)
            .sample(&phase, &conditions())
            .unwrap();
        assert!(points.iter().all(|p| p.site_fractions[1] < 1.0));
    }
}
