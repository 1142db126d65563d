use serde::Deserialize;

/// A temperature-dependent coefficient `a + b·T + c·T·ln(T)`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TemperatureExpression {
    #[serde(default)]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub c: f64,
}

impl TemperatureExpression {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn constant(a: f64) -> Self {
        Self { a, b: 0.0, c: 0.0 }
    }

    #[inline]
    pub fn value(&self, temperature: f64) -> f64 {
        let mut value = self.a + self.b * temperature;
        if self.c != 0.0 {
            value += self.c * temperature * temperature.ln();
        }
        value
    }
}

/// One model parameter in constituent-array form.
///
/// `constituents` holds one list per sublattice. A parameter with exactly one
/// constituent on every sublattice is an endmember (reference) energy; any
/// sublattice with two or three constituents makes it an interaction term. The
/// wildcard `"*"` stands for every constituent of its sublattice.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelParameter {
    pub constituents: Vec<Vec<String>>,
    #[serde(default)]
    pub order: u32,
    pub value: TemperatureExpression,
}

impl ModelParameter {
    pub fn new(constituents: &[&[&str]], order: u32, value: TemperatureExpression) -> Self {
        Self {
            constituents: constituents
                .iter()
                .map(|s| s.iter().map(|c| c.to_string()).collect())
                .collect(),
            order,
            value,
        }
    }

    pub fn is_endmember(&self) -> bool {
        self.constituents
            .iter()
            .all(|s| s.len() == 1 && s[0] != WILDCARD)
    }
}

pub const WILDCARD: &str = "*";
