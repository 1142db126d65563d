use super::points::{CandidatePoint, PointOrigin, PointStore};
use super::tasks::lower_hull::HullSolution;
use super::tasks::minima_locator::LocatorReport;

/// Counters describing how a result was reached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub points_sampled: usize,
    pub points_refined: usize,
    pub points_polished: usize,
    pub refinement_rounds: usize,
    pub polish_rounds: usize,
    pub boxes_evaluated: usize,
    pub boxes_pruned: usize,
    pub boxes_accepted: usize,
    pub max_depth_hits: usize,
    pub frontier_truncations: usize,
    pub simplex_iterations: usize,
    /// Whether any hull solve needed the degenerate-facet tie-break.
    pub degenerate_facet: bool,
}

/// Mutable state of one calculation between hull solves.
///
/// Points only ever accumulate, so every re-solve sees a superset of the
/// previous candidates and the hull energy can only go down.
#[derive(Debug)]
pub struct SolverState {
    pub store: PointStore,
    pub hull: HullSolution,
    pub diagnostics: Diagnostics,
    pub approximate: bool,
}

impl SolverState {
    pub fn new(store: PointStore, hull: HullSolution) -> Self {
        let mut state = Self {
            diagnostics: Diagnostics {
                points_sampled: store.count_by_origin(PointOrigin::Sampled),
                ..Diagnostics::default()
            },
            store,
            hull: hull.clone(),
            approximate: false,
        };
        state.record_hull(&hull);
        state
    }

    pub fn energy(&self) -> f64 {
        self.hull.energy
    }

    pub fn potentials(&self) -> &[f64] {
        &self.hull.potentials
    }

    /// Facet vertices paired with their points, in point-id order.
    pub fn facet(&self) -> impl Iterator<Item = (&CandidatePoint, f64)> + '_ {
        self.hull
            .vertices
            .iter()
            .filter_map(|v| self.store.get(v.point).map(|p| (p, v.weight)))
    }

    /// Replaces the hull, returning the energy decrease it brought.
    pub fn update_hull(&mut self, hull: HullSolution) -> f64 {
        let decrease = self.hull.energy - hull.energy;
        self.record_hull(&hull);
        self.hull = hull;
        decrease
    }

    pub fn record_locator(&mut self, report: &LocatorReport) {
        self.diagnostics.boxes_evaluated += report.boxes_evaluated;
        self.diagnostics.boxes_pruned += report.pruned;
        self.diagnostics.boxes_accepted += report.accepted;
        self.diagnostics.max_depth_hits += report.max_depth_hits;
        self.diagnostics.frontier_truncations += report.truncated;
        self.approximate |= report.approximate;
    }

    fn record_hull(&mut self, hull: &HullSolution) {
        self.diagnostics.simplex_iterations += hull.iterations;
        self.diagnostics.degenerate_facet |= hull.degenerate;
    }

    /// Brings the point counters in line with the store.
    pub fn sync_point_counts(&mut self) {
        self.diagnostics.points_refined = self.store.count_by_origin(PointOrigin::Refined);
        self.diagnostics.points_polished = self.store.count_by_origin(PointOrigin::Polished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tasks::lower_hull::FacetVertex;

    fn hull(energy: f64, degenerate: bool) -> HullSolution {
        HullSolution {
            vertices: vec![FacetVertex {
                point: 0,
                weight: 1.0,
            }],
            potentials: vec![energy],
            energy,
            degenerate,
            iterations: 2,
        }
    }

    fn store() -> PointStore {
        let mut store = PointStore::new(1, 1e-3);
        store.push(CandidatePoint {
            phase: 0,
            site_fractions: vec![1.0],
            energy: -1.0,
            composition: vec![1.0],
            origin: PointOrigin::Sampled,
        });
        store
    }

    #[test]
    fn update_hull_reports_decrease_and_accumulates_diagnostics() {
        let mut state = SolverState::new(store(), hull(-1.0, false));
        assert_eq!(state.diagnostics.points_sampled, 1);
        let decrease = state.update_hull(hull(-1.5, true));
        assert!((decrease - 0.5).abs() < 1e-12);
        assert_eq!(state.energy(), -1.5);
        assert_eq!(state.diagnostics.simplex_iterations, 4);
        assert!(state.diagnostics.degenerate_facet);
    }

    #[test]
    fn approximate_locator_report_marks_state() {
        let mut state = SolverState::new(store(), hull(-1.0, false));
        state.record_locator(&LocatorReport {
            max_depth_hits: 2,
            approximate: true,
            ..LocatorReport::default()
        });
        assert!(state.approximate);
        assert_eq!(state.diagnostics.max_depth_hits, 2);
        assert_eq!(state.facet().count(), 1);
    }
}
