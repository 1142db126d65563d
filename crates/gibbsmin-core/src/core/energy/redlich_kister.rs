use super::params::{ModelParameter, TemperatureExpression, WILDCARD};
use super::potentials::{GAS_CONSTANT, y_ln_y, y_ln_y_derivative};
use super::term::EnergyEvaluation;
use super::EnergyFunction;
use crate::core::models::phase::{PhaseDefinition, PhaseDefinitionError, VACANCY};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid phase definition: {0}")]
    Phase(#[from] PhaseDefinitionError),
    #[error("Parameter #{index} of phase '{phase}': {reason}")]
    InvalidParameter {
        phase: String,
        index: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum SiteFactor {
    Single(usize),
    Wildcard(Range<usize>),
    Binary {
        first: usize,
        second: usize,
        order: i32,
    },
    Ternary {
        sites: [usize; 3],
        corrected: Option<usize>,
    },
}

impl SiteFactor {
    fn value(&self, y: &[f64]) -> f64 {
        match self {
            Self::Single(i) => y[*i],
            Self::Wildcard(block) => y[block.clone()].iter().sum(),
            Self::Binary {
                first,
                second,
                order,
            } => y[*first] * y[*second] * (y[*first] - y[*second]).powi(*order),
            Self::Ternary { sites, corrected } => {
                let product = y[sites[0]] * y[sites[1]] * y[sites[2]];
                match corrected {
                    Some(m) => product * muggianu_fraction(y, sites, *m),
                    None => product,
                }
            }
        }
    }

    fn accumulate_gradient(&self, y: &[f64], scale: f64, gradient: &mut [f64]) {
        match self {
            Self::Single(i) => gradient[*i] += scale,
            Self::Wildcard(block) => gradient[block.clone()].iter_mut().for_each(|g| *g += scale),
            Self::Binary {
                first,
                second,
                order,
            } => {
                let (yi, yj) = (y[*first], y[*second]);
                let d = yi - yj;
                let dk = d.powi(*order);
                let dk1 = if *order > 0 {
                    f64::from(*order) * d.powi(order - 1)
                } else {
                    0.0
                };
                gradient[*first] += scale * (yj * dk + yi * yj * dk1);
                gradient[*second] += scale * (yi * dk - yi * yj * dk1);
            }
            Self::Ternary { sites, corrected } => {
                let [a, b, c] = *sites;
                let partials = [y[b] * y[c], y[a] * y[c], y[a] * y[b]];
                match corrected {
                    None => {
                        for (q, &site) in sites.iter().enumerate() {
                            gradient[site] += scale * partials[q];
                        }
                    }
                    Some(m) => {
                        let product = y[a] * y[b] * y[c];
                        let w = muggianu_fraction(y, sites, *m);
                        for (q, &site) in sites.iter().enumerate() {
                            let dw = if site == *m { 1.0 } else { 0.0 } - 1.0 / 3.0;
                            gradient[site] += scale * (partials[q] * w + product * dw);
                        }
                    }
                }
            }
        }
    }
}

/// `y_m + (1 - y_a - y_b - y_c) / 3`, the site fraction renormalised so the three
/// corrected fractions of a ternary interaction always sum to one.
#[inline]
fn muggianu_fraction(y: &[f64], sites: &[usize; 3], m: usize) -> f64 {
    let sum: f64 = sites.iter().map(|&s| y[s]).sum();
    y[m] + (1.0 - sum) / 3.0
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledTerm {
    factors: Vec<SiteFactor>,
    value: TemperatureExpression,
}

/// Compound-energy-formalism model with Redlich-Kister excess terms.
///
/// The molar Gibbs energy per mole of atoms is
///
/// ```text
/// G = [ Σ_terms L(T) Π_s f_s(y) + R T Σ_s a_s Σ_i y_si ln y_si ] / N(y)
/// N(y) = Σ_s a_s (1 - y_s,VA)
/// ```
///
/// where each term's per-sublattice factor `f_s` is a single site fraction for an
/// endmember sublattice, `y_i y_j (y_i - y_j)^k` for a binary interaction of order
/// `k`, a Muggianu-corrected ternary product, or the block sum for a wildcard.
/// The model has no pressure dependence.
#[derive(Debug, Clone, PartialEq)]
pub struct RedlichKisterModel {
    phase_name: String,
    len: usize,
    terms: Vec<CompiledTerm>,
    mixing_blocks: Vec<(f64, Range<usize>)>,
    vacancy_sites: Vec<(usize, f64)>,
    total_sites: f64,
}

impl RedlichKisterModel {
    pub fn new(
        definition: &PhaseDefinition,
        parameters: &[ModelParameter],
    ) -> Result<Self, ModelError> {
        definition.validate()?;
        let blocks = definition.blocks();

        let terms = parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| {
                compile_parameter(definition, &blocks, parameters, parameter).map_err(|reason| {
                    ModelError::InvalidParameter {
                        phase: definition.name.clone(),
                        index,
                        reason,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mixing_blocks = definition
            .sublattices
            .iter()
            .zip(&blocks)
            .filter(|(sublattice, _)| sublattice.len() > 1)
            .map(|(sublattice, block)| (sublattice.multiplicity, block.clone()))
            .collect();

        let vacancy_sites = definition
            .sublattices
            .iter()
            .zip(&blocks)
            .flat_map(|(sublattice, block)| {
                sublattice
                    .constituents
                    .iter()
                    .zip(block.clone())
                    .filter(|(name, _)| name.as_str() == VACANCY)
                    .map(|(_, index)| (index, sublattice.multiplicity))
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Self {
            phase_name: definition.name.clone(),
            len: definition.constituent_count(),
            terms,
            mixing_blocks,
            vacancy_sites,
            total_sites: definition.multiplicities().iter().sum(),
        })
    }

    pub fn phase_name(&self) -> &str {
        &self.phase_name
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

fn compile_parameter(
    definition: &PhaseDefinition,
    blocks: &[Range<usize>],
    all: &[ModelParameter],
    parameter: &ModelParameter,
) -> Result<CompiledTerm, String> {
    if parameter.constituents.len() != definition.sublattice_count() {
        return Err(format!(
            "constituent array has {} sublattices, phase has {}",
            parameter.constituents.len(),
            definition.sublattice_count()
        ));
    }

    let mut factors = Vec::with_capacity(parameter.constituents.len());
    let mut interacting = false;

    for (s, names) in parameter.constituents.iter().enumerate() {
        if names.len() == 1 && names[0] == WILDCARD {
            factors.push(SiteFactor::Wildcard(blocks[s].clone()));
            continue;
        }

        let mut sites = Vec::with_capacity(names.len());
        for name in names {
            let site = definition
                .site_index(s, name)
                .ok_or_else(|| format!("'{name}' is not a constituent of sublattice {s}"))?;
            if sites.contains(&site) {
                return Err(format!("'{name}' appears twice on sublattice {s}"));
            }
            sites.push(site);
        }

        let factor = match sites.as_slice() {
            [single] => SiteFactor::Single(*single),
            [first, second] => {
                interacting = true;
                SiteFactor::Binary {
                    first: *first,
                    second: *second,
                    order: i32::try_from(parameter.order)
                        .map_err(|_| format!("order {} is too large", parameter.order))?,
                }
            }
            [a, b, c] => {
                interacting = true;
                if parameter.order > 2 {
                    return Err(format!(
                        "ternary interaction order must be 0, 1 or 2, got {}",
                        parameter.order
                    ));
                }
                let sites = [*a, *b, *c];
                SiteFactor::Ternary {
                    sites,
                    corrected: if is_symmetric_ternary(all, parameter) {
                        None
                    } else {
                        Some(sites[parameter.order as usize])
                    },
                }
            }
            [] => return Err(format!("sublattice {s} has an empty constituent list")),
            _ => {
                return Err(format!(
                    "interactions of more than three constituents on sublattice {s} are not supported"
                ));
            }
        };
        factors.push(factor);
    }

    if parameter.order > 0 && !interacting {
        return Err(format!(
            "order {} requires an interacting sublattice",
            parameter.order
        ));
    }

    Ok(CompiledTerm {
        factors,
        value: parameter.value,
    })
}

/// A ternary order-0 parameter with no order-1 or order-2 companion for the same
/// constituent array stands for all three orders with the same value. Their
/// Muggianu-corrected fractions sum to one, leaving the bare product.
fn is_symmetric_ternary(all: &[ModelParameter], parameter: &ModelParameter) -> bool {
    parameter.order == 0
        && !all
            .iter()
            .any(|other| other.order > 0 && other.constituents == parameter.constituents)
}

impl EnergyFunction for RedlichKisterModel {
    fn evaluate(&self, site_fractions: &[f64], temperature: f64, _pressure: f64) -> EnergyEvaluation {
        let y = site_fractions;
        if y.len() != self.len {
            return EnergyEvaluation::constant(f64::NAN, y.len());
        }

        let mut numerator = 0.0;
        let mut gradient = vec![0.0; self.len];
        let mut values = Vec::new();

        for term in &self.terms {
            let coefficient = term.value.value(temperature);
            if coefficient == 0.0 {
                continue;
            }
            values.clear();
            values.extend(term.factors.iter().map(|f| f.value(y)));
            numerator += coefficient * values.iter().product::<f64>();

            for (s, factor) in term.factors.iter().enumerate() {
                let others: f64 = values
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != s)
                    .map(|(_, v)| v)
                    .product();
                if others != 0.0 {
                    factor.accumulate_gradient(y, coefficient * others, &mut gradient);
                }
            }
        }

        let rt = GAS_CONSTANT * temperature;
        for (multiplicity, block) in &self.mixing_blocks {
            for i in block.clone() {
                numerator += rt * multiplicity * y_ln_y(y[i]);
                gradient[i] += rt * multiplicity * y_ln_y_derivative(y[i]);
            }
        }

        let vacant: f64 = self.vacancy_sites.iter().map(|(i, a)| a * y[*i]).sum();
        let atoms = self.total_sites - vacant;
        if atoms <= 1e-12 {
            return EnergyEvaluation::constant(f64::INFINITY, self.len);
        }

        let energy = numerator / atoms;
        gradient.iter_mut().for_each(|g| *g /= atoms);
        for (i, a) in &self.vacancy_sites {
            gradient[*i] += energy * a / atoms;
        }

        EnergyEvaluation::new(energy, gradient)
    }
}
