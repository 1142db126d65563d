/// Molar Gibbs energy and its gradient with respect to the site fractions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnergyEvaluation {
    pub energy: f64,
    pub gradient: Vec<f64>,
}

impl EnergyEvaluation {
    pub fn new(energy: f64, gradient: Vec<f64>) -> Self {
        Self { energy, gradient }
    }

    /// An evaluation carrying only a value, with a zero gradient of length `len`.
    pub fn constant(energy: f64, len: usize) -> Self {
        Self {
            energy,
            gradient: vec![0.0; len],
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.energy.is_finite() && self.gradient.iter().all(|g| g.is_finite())
    }
}
