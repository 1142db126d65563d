use super::phase::{PhaseDefinition, Sublattice};

/// One stable phase instance of an equilibrium result.
///
/// A phase that splits into several instances (a miscibility gap) yields one
/// composition set per instance; `label` tells them apart (`FCC_A1#2`) while
/// `phase_name` always names the underlying phase.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionSet {
    /// Name of the phase in the database.
    pub phase_name: String,
    /// Unique label within one result.
    pub label: String,
    /// Sublattice layout copied from the phase definition.
    pub sublattices: Vec<Sublattice>,
    /// Flat site-fraction vector, sublattice after sublattice.
    pub site_fractions: Vec<f64>,
    /// Molar amount of this set relative to the whole system.
    pub phase_fraction: f64,
    /// Overall mole fractions in condition component order.
    pub mole_fractions: Vec<f64>,
    /// Molar Gibbs energy of the set at its constitution.
    pub energy: f64,
}

impl CompositionSet {
    pub fn new(
        definition: &PhaseDefinition,
        label: String,
        site_fractions: Vec<f64>,
        phase_fraction: f64,
        mole_fractions: Vec<f64>,
        energy: f64,
    ) -> Self {
        Self {
            phase_name: definition.name.clone(),
            label,
            sublattices: definition.sublattices.clone(),
            site_fractions,
            phase_fraction,
            mole_fractions,
            energy,
        }
    }

    #[inline]
    pub fn sublattice_count(&self) -> usize {
        self.sublattices.len()
    }

    pub fn multiplicities(&self) -> Vec<f64> {
        self.sublattices.iter().map(|s| s.multiplicity).collect()
    }

    /// Site fractions of one sublattice.
    pub fn sublattice_fractions(&self, sublattice: usize) -> Option<&[f64]> {
        let start: usize = self
            .sublattices
            .get(..sublattice)?
            .iter()
            .map(Sublattice::len)
            .sum();
        let len = self.sublattices.get(sublattice)?.len();
        self.site_fractions.get(start..start + len)
    }

    pub fn site_fraction(&self, sublattice: usize, constituent: &str) -> Option<f64> {
        let position = self
            .sublattices
            .get(sublattice)?
            .constituents
            .iter()
            .position(|c| c == constituent)?;
        self.sublattice_fractions(sublattice)
            .map(|block| block[position])
    }

    /// Whether every sublattice block sums to one within `tolerance`, every
    /// fraction lies in [0, 1] and the phase fraction is non-negative.
    pub fn satisfies_constraints(&self, tolerance: f64) -> bool {
        let blocks_ok = (0..self.sublattice_count()).all(|s| {
            self.sublattice_fractions(s).is_some_and(|block| {
                let sum: f64 = block.iter().sum();
                (sum - 1.0).abs() <= tolerance
                    && block.iter().all(|y| (-tolerance..=1.0 + tolerance).contains(y))
            })
        });
        blocks_ok && self.phase_fraction >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> CompositionSet {
        let definition = PhaseDefinition::new(
            "SIGMA",
            vec![
                Sublattice::new(10.0, &["FE"]),
                Sublattice::new(4.0, &["CR"]),
                Sublattice::new(16.0, &["CR", "FE"]),
            ],
        );
        CompositionSet::new(
            &definition,
            "SIGMA".to_string(),
            vec![1.0, 1.0, 0.25, 0.75],
            0.4,
            vec![0.3, 0.7],
            -1234.5,
        )
    }

    #[test]
    fn sublattice_fractions_slices_flat_vector() {
        let set = sample_set();
        assert_eq!(set.sublattice_fractions(0), Some(&[1.0][..]));
        assert_eq!(set.sublattice_fractions(2), Some(&[0.25, 0.75][..]));
        assert_eq!(set.sublattice_fractions(3), None);
    }

    #[test]
    fn site_fraction_looks_up_by_constituent_name() {
        let set = sample_set();
        assert_eq!(set.site_fraction(2, "FE"), Some(0.75));
        assert_eq!(set.site_fraction(1, "FE"), None);
    }

    #[test]
    fn satisfies_constraints_detects_broken_block_sum() {
        let mut set = sample_set();
        assert!(set.satisfies_constraints(1e-9));
        set.site_fractions[3] = 0.7;
        assert!(!set.satisfies_constraints(1e-9));
    }

    #[test]
    fn satisfies_constraints_rejects_negative_phase_fraction() {
        let mut set = sample_set();
        set.phase_fraction = -0.1;
        assert!(!set.satisfies_constraints(1e-9));
    }
}
