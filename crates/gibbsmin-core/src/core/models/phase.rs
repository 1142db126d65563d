use serde::Deserialize;
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

/// Constituent name reserved for vacant sites.
pub const VACANCY: &str = "VA";

/// A structural site group of a phase.
///
/// The constituent occupancy fractions of a sublattice sum to one independently
/// of every other sublattice. The multiplicity is the number of sites of this
/// kind per formula unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sublattice {
    pub multiplicity: f64,
    pub constituents: Vec<String>,
}

impl Sublattice {
    pub fn new(multiplicity: f64, constituents: &[&str]) -> Self {
        Self {
            multiplicity,
            constituents: constituents.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.constituents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constituents.is_empty()
    }
}

/// Errors raised when a phase's sublattice or constituent data is malformed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhaseDefinitionError {
    #[error("Phase has no sublattices")]
    NoSublattices,
    #[error("Sublattice {index} has non-positive multiplicity {value}")]
    NonPositiveMultiplicity { index: usize, value: f64 },
    #[error("Sublattice {index} has an empty constituent list")]
    EmptyConstituents { index: usize },
    #[error("Sublattice {index} lists constituent '{name}' more than once")]
    DuplicateConstituent { index: usize, name: String },
    #[error("Constituent '{name}' is neither a system component nor a vacancy")]
    UnknownConstituent { name: String },
    #[error("Phase can only hold vacancies and has no defined composition")]
    VacancyOnly,
}

/// The static description of a candidate phase: its name and its sublattices.
///
/// Site-fraction vectors for a phase are laid out flat, sublattice after
/// sublattice, in the order the constituents are listed here.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDefinition {
    pub name: String,
    pub sublattices: Vec<Sublattice>,
}

impl PhaseDefinition {
    pub fn new(name: &str, sublattices: Vec<Sublattice>) -> Self {
        Self {
            name: name.to_string(),
            sublattices,
        }
    }

    /// Checks multiplicities and constituent lists.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found, scanning sublattices in order.
    pub fn validate(&self) -> Result<(), PhaseDefinitionError> {
        if self.sublattices.is_empty() {
            return Err(PhaseDefinitionError::NoSublattices);
        }
        for (index, sublattice) in self.sublattices.iter().enumerate() {
            if !(sublattice.multiplicity.is_finite() && sublattice.multiplicity > 0.0) {
                return Err(PhaseDefinitionError::NonPositiveMultiplicity {
                    index,
                    value: sublattice.multiplicity,
                });
            }
            if sublattice.is_empty() {
                return Err(PhaseDefinitionError::EmptyConstituents { index });
            }
            let mut seen = HashSet::with_capacity(sublattice.len());
            for name in &sublattice.constituents {
                if !seen.insert(name.as_str()) {
                    return Err(PhaseDefinitionError::DuplicateConstituent {
                        index,
                        name: name.clone(),
                    });
                }
            }
        }
        let vacancy_only = self
            .sublattices
            .iter()
            .all(|s| s.constituents.iter().all(|c| c == VACANCY));
        if vacancy_only {
            return Err(PhaseDefinitionError::VacancyOnly);
        }
        Ok(())
    }

    #[inline]
    pub fn sublattice_count(&self) -> usize {
        self.sublattices.len()
    }

    pub fn multiplicities(&self) -> Vec<f64> {
        self.sublattices.iter().map(|s| s.multiplicity).collect()
    }

    /// Total number of constituents across all sublattices, i.e. the length of
    /// a site-fraction vector for this phase.
    pub fn constituent_count(&self) -> usize {
        self.sublattices.iter().map(Sublattice::len).sum()
    }

    /// Number of independent internal degrees of freedom.
    pub fn degrees_of_freedom(&self) -> usize {
        self.sublattices
            .iter()
            .map(|s| s.len().saturating_sub(1))
            .sum()
    }

    /// A phase is stoichiometric when every sublattice holds a single constituent.
    pub fn is_stoichiometric(&self) -> bool {
        self.degrees_of_freedom() == 0
    }

    /// Index ranges of each sublattice block inside a flat site-fraction vector.
    pub fn blocks(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.sublattices
            .iter()
            .map(|s| {
                let range = start..start + s.len();
                start += s.len();
                range
            })
            .collect()
    }

    /// Flat index of `constituent` on sublattice `sublattice`.
    pub fn site_index(&self, sublattice: usize, constituent: &str) -> Option<usize> {
        let offset: usize = self.sublattices[..sublattice.min(self.sublattices.len())]
            .iter()
            .map(Sublattice::len)
            .sum();
        self.sublattices
            .get(sublattice)?
            .constituents
            .iter()
            .position(|c| c == constituent)
            .map(|i| offset + i)
    }

    /// Builds the projection from site fractions to overall mole fractions of
    /// `components`.
    ///
    /// # Errors
    ///
    /// Fails when a constituent is neither one of `components` nor a vacancy.
    pub fn stoichiometry(&self, components: &[String]) -> Result<Stoichiometry, PhaseDefinitionError> {
        let mut weights = Vec::with_capacity(self.constituent_count());
        let mut species = Vec::with_capacity(self.constituent_count());
        let mut total_sites = 0.0;

        for sublattice in &self.sublattices {
            total_sites += sublattice.multiplicity;
            for name in &sublattice.constituents {
                weights.push(sublattice.multiplicity);
                if name == VACANCY {
                    species.push(Species::Vacancy);
                } else {
                    let index = components.iter().position(|c| c == name).ok_or_else(|| {
                        PhaseDefinitionError::UnknownConstituent { name: name.clone() }
                    })?;
                    species.push(Species::Component(index));
                }
            }
        }

        Ok(Stoichiometry {
            weights,
            species,
            total_sites,
            component_count: components.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Species {
    Component(usize),
    Vacancy,
}

/// Linear-fractional map from a phase's site fractions to overall mole fractions.
///
/// `x_k = Σ a_s y_{s,k} / Σ_s a_s (1 - y_{s,VA})`; vacancies carry no atoms.
#[derive(Debug, Clone, PartialEq)]
pub struct Stoichiometry {
    weights: Vec<f64>,
    species: Vec<Species>,
    total_sites: f64,
    component_count: usize,
}

/// Below this many atoms per formula unit the composition is treated as undefined.
const MIN_ATOMS_PER_FORMULA: f64 = 1e-12;

impl Stoichiometry {
    #[inline]
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// Atoms per formula unit for the given occupancy.
    pub fn atoms_per_formula(&self, site_fractions: &[f64]) -> f64 {
        let vacant: f64 = self
            .species
            .iter()
            .zip(&self.weights)
            .zip(site_fractions)
            .filter(|((species, _), _)| **species == Species::Vacancy)
            .map(|((_, weight), y)| weight * y)
            .sum();
        self.total_sites - vacant
    }

    /// Overall mole fractions, or `None` when the occupancy holds no atoms.
    pub fn project(&self, site_fractions: &[f64]) -> Option<Vec<f64>> {
        let atoms = self.atoms_per_formula(site_fractions);
        if atoms <= MIN_ATOMS_PER_FORMULA {
            return None;
        }
        let mut composition = vec![0.0; self.component_count];
        for ((species, weight), y) in self.species.iter().zip(&self.weights).zip(site_fractions) {
            if let Species::Component(k) = species {
                composition[*k] += weight * y;
            }
        }
        composition.iter_mut().for_each(|x| *x /= atoms);
        Some(composition)
    }

    /// Gradient with respect to the site fractions of the plane value `Σ μ_k x_k(y)`.
    pub fn plane_gradient(&self, site_fractions: &[f64], potentials: &[f64]) -> Option<Vec<f64>> {
        let atoms = self.atoms_per_formula(site_fractions);
        if atoms <= MIN_ATOMS_PER_FORMULA {
            return None;
        }
        let composition = self.project(site_fractions)?;
        let plane: f64 = composition.iter().zip(potentials).map(|(x, mu)| x * mu).sum();

        Some(
            self.species
                .iter()
                .zip(&self.weights)
                .map(|(species, weight)| match species {
                    Species::Component(k) => potentials[*k] * weight / atoms,
                    Species::Vacancy => plane * weight / atoms,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn components(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn interstitial_phase() -> PhaseDefinition {
        PhaseDefinition::new(
            "BCC_A2",
            vec![
                Sublattice::new(1.0, &["FE", "CR"]),
                Sublattice::new(3.0, &["C", "VA"]),
            ],
        )
    }

    #[test]
    fn validate_accepts_well_formed_phase() {
        assert!(interstitial_phase().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_multiplicity() {
        let phase = PhaseDefinition::new("BAD", vec![Sublattice::new(0.0, &["A"])]);
        assert_eq!(
            phase.validate(),
            Err(PhaseDefinitionError::NonPositiveMultiplicity {
                index: 0,
                value: 0.0
            })
        );
    }

    #[test]
    fn validate_rejects_empty_constituent_list() {
        let phase = PhaseDefinition::new(
            "BAD",
            vec![Sublattice::new(1.0, &["A"]), Sublattice::new(1.0, &[])],
        );
        assert_eq!(
            phase.validate(),
            Err(PhaseDefinitionError::EmptyConstituents { index: 1 })
        );
    }

    #[test]
    fn validate_rejects_vacancy_only_phase() {
        let phase = PhaseDefinition::new("VOID", vec![Sublattice::new(1.0, &["VA"])]);
        assert_eq!(phase.validate(), Err(PhaseDefinitionError::VacancyOnly));
    }

    #[test]
    fn degrees_of_freedom_and_blocks_follow_sublattice_layout() {
        let phase = interstitial_phase();
        assert_eq!(phase.constituent_count(), 4);
        assert_eq!(phase.degrees_of_freedom(), 2);
        assert_eq!(phase.blocks(), vec![0..2, 2..4]);
        assert_eq!(phase.site_index(1, "VA"), Some(3));
        assert_eq!(phase.site_index(0, "VA"), None);
    }

    #[test]
    fn stoichiometry_rejects_unknown_constituent() {
        let result = interstitial_phase().stoichiometry(&components(&["FE", "CR"]));
        assert!(matches!(
            result,
            Err(PhaseDefinitionError::UnknownConstituent { name }) if name == "C"
        ));
    }

    #[test]
    fn projection_excludes_vacancies_from_atom_count() {
        let stoich = interstitial_phase()
            .stoichiometry(&components(&["C", "CR", "FE"]))
            .unwrap();
        // FE on the metal site, one third of the interstitial sites filled by C.
        let x = stoich.project(&[1.0, 0.0, 1.0 / 3.0, 2.0 / 3.0]).unwrap();
        assert!((x[0] - 0.5).abs() < TOLERANCE);
        assert!(x[1].abs() < TOLERANCE);
        assert!((x[2] - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn plane_gradient_matches_finite_differences() {
        let stoich = interstitial_phase()
            .stoichiometry(&components(&["C", "CR", "FE"]))
            .unwrap();
        let mu = [-3.0, 1.5, 2.0];
        let y = [0.3, 0.7, 0.2, 0.8];
        let plane = |y: &[f64]| -> f64 {
            stoich
                .project(y)
                .unwrap()
                .iter()
                .zip(&mu)
                .map(|(x, m)| x * m)
                .sum()
        };
        let gradient = stoich.plane_gradient(&y, &mu).unwrap();
        let h = 1e-6;
        for i in 0..y.len() {
            let mut up = y;
            let mut down = y;
            up[i] += h;
            down[i] -= h;
            let numeric = (plane(&up) - plane(&down)) / (2.0 * h);
            assert!((numeric - gradient[i]).abs() < 1e-6, "index {i}");
        }
    }
}
