use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::conditions::ConditionError;

/// Achievable range of one component's overall mole fraction over the
/// available candidate points.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentBracket {
    pub component: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Error)]
pub enum EquilibriumError {
    #[error("Invalid conditions: {0}")]
    InvalidConditions(#[from] ConditionError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid definition of phase '{phase}': {reason}")]
    InvalidPhaseDefinition { phase: String, reason: String },

    #[error("Phase '{0}' is not present in the database")]
    UnknownPhase(String),

    #[error("Requested composition cannot be reached: {reason}")]
    InfeasibleConditions {
        reason: String,
        bracket: Vec<ComponentBracket>,
    },

    #[error("Phase '{phase}' produced {found} usable sample points, at least {required} are needed")]
    InsufficientSamples {
        phase: String,
        found: usize,
        required: usize,
    },

    #[error("Energy evaluation for phase '{phase}' failed: {reason}")]
    EnergyEvaluation { phase: String, reason: String },

    #[error("Stage '{stage}' failed to converge after {iterations} iterations")]
    Convergence {
        stage: &'static str,
        iterations: usize,
    },

    #[error("Calculation was cancelled")]
    Cancelled,
}
