use super::config::EquilibriumConfig;
use super::error::EquilibriumError;
use super::progress::{CancellationToken, ProgressReporter};
use crate::core::database::Database;
use crate::core::energy::{EnergyEvaluation, EnergyFunction};
use crate::core::models::conditions::ConditionSet;
use crate::core::models::phase::{PhaseDefinition, Stoichiometry, Sublattice, VACANCY};
use crate::core::utils::simplex::block_product;
use std::ops::Range;
use tracing::debug;

#[derive(Clone, Copy)]
pub struct EquilibriumContext<'a> {
    pub conditions: &'a ConditionSet,
    pub config: &'a EquilibriumConfig,
    pub reporter: &'a ProgressReporter<'a>,
    pub cancellation: Option<&'a CancellationToken>,
}

impl<'a> EquilibriumContext<'a> {
    pub fn new(
        conditions: &'a ConditionSet,
        config: &'a EquilibriumConfig,
        reporter: &'a ProgressReporter<'a>,
        cancellation: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            conditions,
            config,
            reporter,
            cancellation,
        }
    }

    pub fn check_cancelled(&self) -> Result<(), EquilibriumError> {
        match self.cancellation {
            Some(token) if token.is_cancelled() => Err(EquilibriumError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Which constituents of a phase can be occupied under the current conditions.
///
/// Constituents that are neither a condition component nor a vacancy have their
/// site fractions pinned to zero, so the solver works on the smaller "active"
/// vector and only expands back to the full layout when reporting. Reduced
/// coordinates drop the last active constituent of every sublattice.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLayout {
    indices: Vec<usize>,
    blocks: Vec<Range<usize>>,
    full_len: usize,
}

impl ActiveLayout {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn blocks(&self) -> &[Range<usize>] {
        &self.blocks
    }

    pub fn degrees_of_freedom(&self) -> usize {
        self.blocks.iter().map(|b| b.len() - 1).sum()
    }

    /// Ranges of each sublattice inside a reduced coordinate vector.
    pub fn reduced_blocks(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.blocks
            .iter()
            .map(|b| {
                let range = start..start + b.len() - 1;
                start = range.end;
                range
            })
            .collect()
    }

    pub fn expand(&self, active: &[f64]) -> Vec<f64> {
        let mut full = vec![0.0; self.full_len];
        for (&i, &y) in self.indices.iter().zip(active) {
            full[i] = y;
        }
        full
    }

    pub fn contract(&self, full: &[f64]) -> Vec<f64> {
        self.indices.iter().map(|&i| full[i]).collect()
    }

    /// Active site fractions for a reduced point. A block whose reduced
    /// coordinates sum past one is scaled back onto the simplex face.
    pub fn to_site_fractions(&self, reduced: &[f64]) -> Vec<f64> {
        let mut y = Vec::with_capacity(self.len());
        for (block, rblock) in self.blocks.iter().zip(self.reduced_blocks()) {
            let coords = &reduced[rblock];
            let sum: f64 = coords.iter().map(|c| c.max(0.0)).sum();
            let scale = if sum > 1.0 { 1.0 / sum } else { 1.0 };
            y.extend(coords.iter().map(|c| c.max(0.0) * scale));
            y.push((1.0 - sum * scale).max(0.0));
            debug_assert_eq!(y.len(), block.end);
        }
        y
    }

    pub fn to_reduced(&self, site_fractions: &[f64]) -> Vec<f64> {
        self.blocks
            .iter()
            .flat_map(|b| site_fractions[b.start..b.end - 1].iter().copied())
            .collect()
    }

    /// Chain rule from an active-space gradient to reduced coordinates.
    pub fn reduce_gradient(&self, gradient: &[f64]) -> Vec<f64> {
        self.blocks
            .iter()
            .flat_map(|b| {
                let last = gradient[b.end - 1];
                gradient[b.start..b.end - 1].iter().map(move |g| g - last)
            })
            .collect()
    }
}

/// Everything the solver needs to know about one phase under fixed conditions.
pub struct PhaseHandle<'a> {
    definition: &'a PhaseDefinition,
    energy: &'a dyn EnergyFunction,
    layout: ActiveLayout,
    stoichiometry: Stoichiometry,
}

/// A phase taking part in the calculation.
///
/// Phases with a single active constituent per sublattice have exactly one
/// possible constitution and never go through sampling or refinement.
pub enum CandidatePhase<'a> {
    Stoichiometric(PhaseHandle<'a>),
    Solution(PhaseHandle<'a>),
}

/// Driving force `G(y) - Σ μ_k x_k(y)` of a constitution against a tangent plane.
#[derive(Debug, Clone, PartialEq)]
pub struct DrivingForce {
    pub value: f64,
    pub gradient: Vec<f64>,
    pub energy: f64,
    pub composition: Vec<f64>,
}

impl<'a> CandidatePhase<'a> {
    /// Prepares a phase for the given components.
    ///
    /// Returns `Ok(None)` when the phase cannot hold any atoms of the system.
    pub fn new(
        definition: &'a PhaseDefinition,
        energy: &'a dyn EnergyFunction,
        components: &[String],
    ) -> Result<Option<Self>, EquilibriumError> {
        definition
            .validate()
            .map_err(|e| EquilibriumError::InvalidPhaseDefinition {
                phase: definition.name.clone(),
                reason: e.to_string(),
            })?;

        let is_active =
            |name: &str| name == VACANCY || components.iter().any(|c| c.as_str() == name);

        let mut indices = Vec::new();
        let mut blocks = Vec::with_capacity(definition.sublattice_count());
        let mut active_sublattices = Vec::with_capacity(definition.sublattice_count());
        for (sublattice, full_block) in definition.sublattices.iter().zip(definition.blocks()) {
            let start = indices.len();
            let names: Vec<&str> = sublattice
                .constituents
                .iter()
                .zip(full_block)
                .filter(|(name, _)| is_active(name.as_str()))
                .map(|(name, index)| {
                    indices.push(index);
                    name.as_str()
                })
                .collect();
            if names.is_empty() {
                debug!(phase = %definition.name, "Sublattice has no active constituent, skipping phase");
                return Ok(None);
            }
            blocks.push(start..indices.len());
            active_sublattices.push(Sublattice::new(sublattice.multiplicity, &names));
        }

        let active_definition = PhaseDefinition::new(&definition.name, active_sublattices);
        if active_definition.validate().is_err() {
            debug!(phase = %definition.name, "Phase can only hold vacancies, skipping phase");
            return Ok(None);
        }
        let stoichiometry = active_definition.stoichiometry(components).map_err(|e| {
            EquilibriumError::InvalidPhaseDefinition {
                phase: definition.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let handle = PhaseHandle {
            definition,
            energy,
            layout: ActiveLayout {
                indices,
                blocks,
                full_len: definition.constituent_count(),
            },
            stoichiometry,
        };

        Ok(Some(if handle.layout.degrees_of_freedom() == 0 {
            Self::Stoichiometric(handle)
        } else {
            Self::Solution(handle)
        }))
    }

    #[inline]
    pub fn handle(&self) -> &PhaseHandle<'a> {
        match self {
            Self::Stoichiometric(handle) | Self::Solution(handle) => handle,
        }
    }

    pub fn name(&self) -> &'a str {
        &self.definition().name
    }

    pub fn definition(&self) -> &'a PhaseDefinition {
        self.handle().definition
    }

    pub fn layout(&self) -> &ActiveLayout {
        &self.handle().layout
    }

    pub fn degrees_of_freedom(&self) -> usize {
        self.layout().degrees_of_freedom()
    }

    pub fn is_solution(&self) -> bool {
        matches!(self, Self::Solution(_))
    }

    /// Every combination of pure-constituent occupancies, in active coordinates.
    pub fn endmembers(&self) -> Vec<Vec<f64>> {
        let per_block: Vec<Vec<Vec<f64>>> = self
            .layout()
            .blocks()
            .iter()
            .map(|b| {
                (0..b.len())
                    .map(|i| {
                        let mut vertex = vec![0.0; b.len()];
                        vertex[i] = 1.0;
                        vertex
                    })
                    .collect()
            })
            .collect();
        block_product(&per_block)
    }

    /// Energy and active-space gradient at active site fractions `y`.
    ///
    /// Fails only when the energy function returns a gradient of the wrong length.
    pub fn evaluate(
        &self,
        y: &[f64],
        temperature: f64,
        pressure: f64,
    ) -> Result<EnergyEvaluation, EquilibriumError> {
        let handle = self.handle();
        let full = handle.layout.expand(y);
        let evaluation = handle.energy.evaluate(&full, temperature, pressure);
        if evaluation.gradient.len() != full.len() {
            return Err(EquilibriumError::EnergyEvaluation {
                phase: self.name().to_string(),
                reason: format!(
                    "gradient has {} entries, expected {}",
                    evaluation.gradient.len(),
                    full.len()
                ),
            });
        }
        Ok(EnergyEvaluation::new(
            evaluation.energy,
            handle.layout.contract(&evaluation.gradient),
        ))
    }

    pub fn composition(&self, y: &[f64]) -> Option<Vec<f64>> {
        self.handle().stoichiometry.project(y)
    }

    /// Driving force at `y`, or `None` where the composition is undefined or the
    /// energy is not finite.
    pub fn driving_force(
        &self,
        y: &[f64],
        conditions: &ConditionSet,
        potentials: &[f64],
    ) -> Result<Option<DrivingForce>, EquilibriumError> {
        let Some(composition) = self.composition(y) else {
            return Ok(None);
        };
        let evaluation = self.evaluate(y, conditions.temperature(), conditions.pressure())?;
        if !evaluation.is_finite() {
            return Ok(None);
        }
        let Some(plane_gradient) = self.handle().stoichiometry.plane_gradient(y, potentials) else {
            return Ok(None);
        };
        let plane: f64 = composition.iter().zip(potentials).map(|(x, mu)| x * mu).sum();
        let gradient = evaluation
            .gradient
            .iter()
            .zip(&plane_gradient)
            .map(|(g, p)| g - p)
            .collect();
        Ok(Some(DrivingForce {
            value: evaluation.energy - plane,
            gradient,
            energy: evaluation.energy,
            composition,
        }))
    }
}

/// Resolves the phases to consider: the named ones, or every database phase when
/// `phase_names` is empty. Phases that cannot form are dropped.
pub fn resolve_candidate_phases<'a, D>(
    database: &'a D,
    conditions: &ConditionSet,
    phase_names: &[&str],
) -> Result<Vec<CandidatePhase<'a>>, EquilibriumError>
where
    D: Database + ?Sized,
{
    let names: Vec<String> = if phase_names.is_empty() {
        database.phase_names()
    } else {
        let mut names: Vec<String> = phase_names.iter().map(|n| n.to_string()).collect();
        names.sort();
        names.dedup();
        names
    };

    let mut phases = Vec::with_capacity(names.len());
    for name in &names {
        let definition = database
            .phase(name)
            .ok_or_else(|| EquilibriumError::UnknownPhase(name.clone()))?;
        let energy = database
            .energy_function(name)
            .ok_or_else(|| EquilibriumError::UnknownPhase(name.clone()))?;
        if let Some(phase) = CandidatePhase::new(definition, energy, conditions.components())? {
            phases.push(phase);
        }
    }
    Ok(phases)
}
