use crate::engine::context::CandidatePhase;
use crate::engine::error::EquilibriumError;

const STEP: f64 = 1e-4;

/// Smallest second directional derivative of a phase's energy at `y` along the
/// exchange directions `e_i - e_j` of constituents sharing a sublattice.
///
/// Directions that would leave the simplex are skipped; `None` when no direction
/// is admissible or an evaluation is not finite.
pub fn min_exchange_curvature(
    phase: &CandidatePhase,
    y: &[f64],
    temperature: f64,
    pressure: f64,
) -> Result<Option<f64>, EquilibriumError> {
    let mut minimum: Option<f64> = None;
    for block in phase.layout().blocks() {
        for i in block.clone() {
            for j in (i + 1)..block.end {
                if y[i] < STEP || y[j] < STEP {
                    continue;
                }
                let mut forward = y.to_vec();
                let mut backward = y.to_vec();
                forward[i] += STEP;
                forward[j] -= STEP;
                backward[i] -= STEP;
                backward[j] += STEP;

                let g_forward = phase.evaluate(&forward, temperature, pressure)?;
                let g_backward = phase.evaluate(&backward, temperature, pressure)?;
                if !g_forward.is_finite() || !g_backward.is_finite() {
                    continue;
                }
                let slope_forward = g_forward.gradient[i] - g_forward.gradient[j];
                let slope_backward = g_backward.gradient[i] - g_backward.gradient[j];
                let curvature = (slope_forward - slope_backward) / (2.0 * STEP);
                minimum = Some(minimum.map_or(curvature, |m| m.min(curvature)));
            }
        }
    }
    Ok(minimum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::EnergyEvaluation;
    use crate::core::models::phase::{PhaseDefinition, Sublattice};

    fn components() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn double_well_has_negative_curvature_between_minima() {
        let definition = PhaseDefinition::new("L", vec![Sublattice::new(1.0, &["A", "B"])]);
        // (yA - 0.2)^2 (yA - 0.8)^2 has negative curvature at yA = 0.5.
        let double_well = |y: &[f64], _t: f64, _p: f64| {
            let a = y[0] - 0.2;
            let b = y[0] - 0.8;
            EnergyEvaluation::new(a * a * b * b, vec![2.0 * a * b * (a + b), 0.0])
        };
        let phase = CandidatePhase::new(&definition, &double_well, &components())
            .unwrap()
            .unwrap();
        let curvature = min_exchange_curvature(&phase, &[0.5, 0.5], 300.0, 1e5)
            .unwrap()
            .unwrap();
        assert!(curvature < 0.0);
    }

    #[test]
    fn convex_energy_has_positive_curvature() {
        let definition = PhaseDefinition::new("L", vec![Sublattice::new(1.0, &["A", "B"])]);
        let bowl = |y: &[f64], _t: f64, _p: f64| {
            EnergyEvaluation::new(y[0] * y[0] + y[1] * y[1], vec![2.0 * y[0], 2.0 * y[1]])
        };
        let phase = CandidatePhase::new(&definition, &bowl, &components())
            .unwrap()
            .unwrap();
        let curvature = min_exchange_curvature(&phase, &[0.3, 0.7], 300.0, 1e5)
            .unwrap()
            .unwrap();
        assert!((curvature - 4.0).abs() < 1e-6);
    }

    #[test]
    fn boundary_points_have_no_admissible_direction() {
        let definition = PhaseDefinition::new("L", vec![Sublattice::new(1.0, &["A", "B"])]);
        let bowl = |y: &[f64], _t: f64, _p: f64| EnergyEvaluation::constant(0.0, y.len());
        let phase = CandidatePhase::new(&definition, &bowl, &components())
            .unwrap()
            .unwrap();
        assert_eq!(
            min_exchange_curvature(&phase, &[1.0, 0.0], 300.0, 1e5).unwrap(),
            None
        );
    }
}
