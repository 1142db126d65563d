use super::phase::VACANCY;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("Temperature must be positive and finite, got {0}")]
    InvalidTemperature(f64),
    #[error("Pressure must be positive and finite, got {0}")]
    InvalidPressure(f64),
    #[error("At least one component is required")]
    NoComponents,
    #[error("Component '{0}' is listed more than once or is reserved")]
    InvalidComponent(String),
    #[error("Expected {expected} fixed mole fractions for {components} components, got {actual}")]
    WrongFractionCount {
        expected: usize,
        actual: usize,
        components: usize,
    },
    #[error("Mole fraction given for unknown component '{0}'")]
    UnknownComponent(String),
    #[error("Mole fraction of '{component}' must lie in [0, 1], got {value}")]
    FractionOutOfRange { component: String, value: f64 },
    #[error("Fixed mole fractions sum to {0}, which exceeds 1")]
    FractionSumExceedsOne(f64),
}

/// Fixed potentials and overall composition defining one equilibrium query.
///
/// The component list fixes the ordering of every composition vector used by
/// the solver. Exactly one component is left unspecified; its mole fraction is
/// whatever remains after the fixed ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSet {
    temperature: f64,
    pressure: f64,
    components: Vec<String>,
    target: Vec<f64>,
    dependent: usize,
}

const FRACTION_SUM_SLACK: f64 = 1e-12;

impl ConditionSet {
    /// Builds a condition set.
    ///
    /// `mole_fractions` must name every component except one.
    pub fn new(
        temperature: f64,
        pressure: f64,
        components: &[&str],
        mole_fractions: &[(&str, f64)],
    ) -> Result<Self, ConditionError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(ConditionError::InvalidTemperature(temperature));
        }
        if !(pressure.is_finite() && pressure > 0.0) {
            return Err(ConditionError::InvalidPressure(pressure));
        }
        if components.is_empty() {
            return Err(ConditionError::NoComponents);
        }

        let mut seen = HashSet::with_capacity(components.len());
        for &name in components {
            if name == VACANCY || name.is_empty() || !seen.insert(name) {
                return Err(ConditionError::InvalidComponent(name.to_string()));
            }
        }

        let fixed: BTreeMap<&str, f64> = mole_fractions.iter().copied().collect();
        if fixed.len() != components.len() - 1 || mole_fractions.len() != fixed.len() {
            return Err(ConditionError::WrongFractionCount {
                expected: components.len() - 1,
                actual: mole_fractions.len(),
                components: components.len(),
            });
        }

        let mut target = vec![0.0; components.len()];
        let mut fixed_sum = 0.0;
        for (&name, &value) in &fixed {
            let index = components
                .iter()
                .position(|&c| c == name)
                .ok_or_else(|| ConditionError::UnknownComponent(name.to_string()))?;
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(ConditionError::FractionOutOfRange {
                    component: name.to_string(),
                    value,
                });
            }
            target[index] = value;
            fixed_sum += value;
        }
        if fixed_sum > 1.0 + FRACTION_SUM_SLACK {
            return Err(ConditionError::FractionSumExceedsOne(fixed_sum));
        }

        let dependent = components
            .iter()
            .position(|c| !fixed.contains_key(c))
            .ok_or(ConditionError::NoComponents)?;
        target[dependent] = (1.0 - fixed_sum).max(0.0);

        Ok(Self {
            temperature,
            pressure,
            components: components.iter().map(|c| c.to_string()).collect(),
            target,
            dependent,
        })
    }

    #[inline]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    #[inline]
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    #[inline]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// The full overall composition vector, including the dependent component.
    pub fn target_composition(&self) -> &[f64] {
        &self.target
    }

    pub fn dependent_component(&self) -> &str {
        &self.components[self.dependent]
    }

    /// Indices of the n-1 fixed composition coordinates, in component order.
    pub fn fixed_indices(&self) -> Vec<usize> {
        (0..self.components.len())
            .filter(|&i| i != self.dependent)
            .collect()
    }

    pub fn mole_fraction(&self, component: &str) -> Option<f64> {
        self.components
            .iter()
            .position(|c| c == component)
            .map(|i| self.target[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_dependent_component_from_remainder() {
        let conditions =
            ConditionSet::new(1000.0, 101325.0, &["A", "B", "C"], &[("A", 0.2), ("C", 0.5)])
                .unwrap();
        assert_eq!(conditions.dependent_component(), "B");
        assert!((conditions.mole_fraction("B").unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(conditions.fixed_indices(), vec![0, 2]);
    }

    #[test]
    fn unary_system_needs_no_fixed_fraction() {
        let conditions = ConditionSet::new(300.0, 1e5, &["A"], &[]).unwrap();
        assert_eq!(conditions.target_composition(), &[1.0]);
        assert!(conditions.fixed_indices().is_empty());
    }

    #[test]
    fn new_rejects_non_positive_temperature() {
        let result = ConditionSet::new(0.0, 1e5, &["A", "B"], &[("A", 0.5)]);
        assert_eq!(result, Err(ConditionError::InvalidTemperature(0.0)));
    }

    #[test]
    fn new_rejects_wrong_number_of_fractions() {
        let result = ConditionSet::new(300.0, 1e5, &["A", "B"], &[]);
        assert!(matches!(
            result,
            Err(ConditionError::WrongFractionCount { expected: 1, .. })
        ));
    }

    #[test]
    fn new_rejects_fraction_sum_above_one() {
        let result = ConditionSet::new(300.0, 1e5, &["A", "B", "C"], &[("A", 0.7), ("B", 0.6)]);
        assert!(matches!(result, Err(ConditionError::FractionSumExceedsOne(_))));
    }

    #[test]
    fn new_rejects_vacancy_as_component() {
        let result = ConditionSet::new(300.0, 1e5, &["A", "VA"], &[("A", 0.5)]);
        assert_eq!(
            result,
            Err(ConditionError::InvalidComponent("VA".to_string()))
        );
    }

    #[test]
    fn new_rejects_unknown_component() {
        let result = ConditionSet::new(300.0, 1e5, &["A", "B"], &[("Z", 0.5)]);
        assert_eq!(result, Err(ConditionError::UnknownComponent("Z".to_string())));
    }
}
