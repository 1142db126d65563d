use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Invalid { path: String, source: ConfigError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Random points per internal degree of freedom.
    pub density: usize,
    pub seed: u64,
    /// Upper bound on the regular grid size, as a multiple of `density × dof`.
    pub grid_budget_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HullConfig {
    /// Energy tolerance for "on the hyperplane" and lever-rule residuals.
    pub epsilon: f64,
    pub max_tie_candidates: usize,
    /// Same-phase vertices closer than this (max-norm over site fractions) are merged.
    pub merge_distance: f64,
    pub max_simplex_iterations: usize,
}

/// When to run the recursive minima locator on a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefinementPolicy {
    Never,
    /// Every phase with internal degrees of freedom.
    Always,
    /// Phases with at least `dof_threshold` degrees of freedom, plus facet phases
    /// that show a miscibility-gap signature or a directional curvature below
    /// `-curvature_threshold`.
    Auto {
        dof_threshold: usize,
        curvature_threshold: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementConfig {
    pub policy: RefinementPolicy,
    /// Leaf diameter and near-duplicate distance in reduced coordinates.
    pub resolution: f64,
    pub max_depth: usize,
    pub lipschitz_factor: f64,
    pub min_lipschitz: f64,
    pub max_corner_dims: usize,
    pub max_frontier: usize,
    pub max_rounds: usize,
    pub prune_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolishConfig {
    pub enabled: bool,
    pub max_rounds: usize,
    pub max_iterations: usize,
    pub energy_tolerance: f64,
}

/// All numerical knobs of one equilibrium calculation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EquilibriumConfig {
    pub sampling: SamplingConfig,
    pub hull: HullConfig,
    pub refinement: RefinementConfig,
    pub polish: PolishConfig,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            density: 20,
            seed: 0,
            grid_budget_factor: 2.0,
        }
    }
}

impl Default for HullConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-9,
            max_tie_candidates: 48,
            merge_distance: 0.05,
            max_simplex_iterations: 100_000,
        }
    }
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self::Auto {
            dof_threshold: 4,
            curvature_threshold: 0.0,
        }
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            policy: RefinementPolicy::default(),
            resolution: 1e-3,
            max_depth: 48,
            lipschitz_factor: 2.0,
            min_lipschitz: 10.0,
            max_corner_dims: 8,
            max_frontier: 4096,
            max_rounds: 3,
            prune_tolerance: 1e-9,
        }
    }
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rounds: 8,
            max_iterations: 200,
            energy_tolerance: 1e-10,
        }
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}

fn require_non_zero(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: "must be at least 1".to_string(),
        })
    }
}

impl EquilibriumConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_zero("sampling.density", self.sampling.density)?;
        require_positive("sampling.grid_budget_factor", self.sampling.grid_budget_factor)?;

        require_positive("hull.epsilon", self.hull.epsilon)?;
        require_non_zero("hull.max_tie_candidates", self.hull.max_tie_candidates)?;
        if !(self.hull.merge_distance.is_finite() && self.hull.merge_distance >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "hull.merge_distance",
                reason: format!("must be non-negative, got {}", self.hull.merge_distance),
            });
        }
        require_non_zero("hull.max_simplex_iterations", self.hull.max_simplex_iterations)?;

        let refinement = &self.refinement;
        if let RefinementPolicy::Auto {
            curvature_threshold,
            ..
        } = refinement.policy
        {
            if !curvature_threshold.is_finite() || curvature_threshold < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name: "refinement.curvature_threshold",
                    reason: format!("must be non-negative, got {curvature_threshold}"),
                });
            }
        }
        require_positive("refinement.resolution", refinement.resolution)?;
        require_non_zero("refinement.max_depth", refinement.max_depth)?;
        require_positive("refinement.lipschitz_factor", refinement.lipschitz_factor)?;
        require_positive("refinement.min_lipschitz", refinement.min_lipschitz)?;
        require_non_zero("refinement.max_frontier", refinement.max_frontier)?;
        if !(refinement.prune_tolerance.is_finite() && refinement.prune_tolerance >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "refinement.prune_tolerance",
                reason: format!("must be non-negative, got {}", refinement.prune_tolerance),
            });
        }

        require_positive("polish.energy_tolerance", self.polish.energy_tolerance)?;
        Ok(())
    }

    /// Loads a configuration from a TOML file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| ConfigLoadError::Toml {
            path: path_str.clone(),
            source: e,
        })?;
        file.into_config()
            .map_err(|e| ConfigLoadError::Invalid {
                path: path_str,
                source: e,
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    sampling: SamplingSection,
    #[serde(default)]
    hull: HullSection,
    #[serde(default)]
    refinement: RefinementSection,
    #[serde(default)]
    polish: PolishSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SamplingSection {
    density: Option<usize>,
    seed: Option<u64>,
    grid_budget_factor: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct HullSection {
    epsilon: Option<f64>,
    max_tie_candidates: Option<usize>,
    merge_distance: Option<f64>,
    max_simplex_iterations: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum PolicyKind {
    Never,
    Always,
    Auto,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RefinementSection {
    policy: Option<PolicyKind>,
    dof_threshold: Option<usize>,
    curvature_threshold: Option<f64>,
    resolution: Option<f64>,
    max_depth: Option<usize>,
    lipschitz_factor: Option<f64>,
    min_lipschitz: Option<f64>,
    max_corner_dims: Option<usize>,
    max_frontier: Option<usize>,
    max_rounds: Option<usize>,
    prune_tolerance: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PolishSection {
    enabled: Option<bool>,
    max_rounds: Option<usize>,
    max_iterations: Option<usize>,
    energy_tolerance: Option<f64>,
}

impl ConfigFile {
    fn into_config(self) -> Result<EquilibriumConfig, ConfigError> {
        let mut builder = EquilibriumConfigBuilder::new();
        builder.density = self.sampling.density;
        builder.seed = self.sampling.seed;
        builder.grid_budget_factor = self.sampling.grid_budget_factor;

        builder.epsilon = self.hull.epsilon;
        builder.max_tie_candidates = self.hull.max_tie_candidates;
        builder.merge_distance = self.hull.merge_distance;
        builder.max_simplex_iterations = self.hull.max_simplex_iterations;

        let r = self.refinement;
        let default_policy = RefinementPolicy::default();
        let (default_dof, default_curvature) = match default_policy {
            RefinementPolicy::Auto {
                dof_threshold,
                curvature_threshold,
            } => (dof_threshold, curvature_threshold),
            _ => (0, 0.0),
        };
        let auto = RefinementPolicy::Auto {
            dof_threshold: r.dof_threshold.unwrap_or(default_dof),
            curvature_threshold: r.curvature_threshold.unwrap_or(default_curvature),
        };
        builder.policy = match r.policy {
            Some(PolicyKind::Never) => Some(RefinementPolicy::Never),
            Some(PolicyKind::Always) => Some(RefinementPolicy::Always),
            Some(PolicyKind::Auto) => Some(auto),
            None if r.dof_threshold.is_some() || r.curvature_threshold.is_some() => Some(auto),
            None => None,
        };
        builder.resolution = r.resolution;
        builder.max_depth = r.max_depth;
        builder.lipschitz_factor = r.lipschitz_factor;
        builder.min_lipschitz = r.min_lipschitz;
        builder.max_corner_dims = r.max_corner_dims;
        builder.max_frontier = r.max_frontier;
        builder.max_refinement_rounds = r.max_rounds;
        builder.prune_tolerance = r.prune_tolerance;

        builder.polish_enabled = self.polish.enabled;
        builder.max_polish_rounds = self.polish.max_rounds;
        builder.max_polish_iterations = self.polish.max_iterations;
        builder.energy_tolerance = self.polish.energy_tolerance;

        builder.build()
    }
}

/// Builds an [`EquilibriumConfig`]; unset fields keep their defaults.
#[derive(Default)]
pub struct EquilibriumConfigBuilder {
    density: Option<usize>,
    seed: Option<u64>,
    grid_budget_factor: Option<f64>,
    epsilon: Option<f64>,
    max_tie_candidates: Option<usize>,
    merge_distance: Option<f64>,
    max_simplex_iterations: Option<usize>,
    policy: Option<RefinementPolicy>,
    resolution: Option<f64>,
    max_depth: Option<usize>,
    lipschitz_factor: Option<f64>,
    min_lipschitz: Option<f64>,
    max_corner_dims: Option<usize>,
    max_frontier: Option<usize>,
    max_refinement_rounds: Option<usize>,
    prune_tolerance: Option<f64>,
    polish_enabled: Option<bool>,
    max_polish_rounds: Option<usize>,
    max_polish_iterations: Option<usize>,
    energy_tolerance: Option<f64>,
}

impl EquilibriumConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn density(mut self, density: usize) -> Self {
        self.density = Some(density);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn grid_budget_factor(mut self, factor: f64) -> Self {
        self.grid_budget_factor = Some(factor);
        self
    }
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }
    pub fn max_tie_candidates(mut self, n: usize) -> Self {
        self.max_tie_candidates = Some(n);
        self
    }
    pub fn merge_distance(mut self, distance: f64) -> Self {
        self.merge_distance = Some(distance);
        self
    }
    pub fn max_simplex_iterations(mut self, iterations: usize) -> Self {
        self.max_simplex_iterations = Some(iterations);
        self
    }
    pub fn refinement_policy(mut self, policy: RefinementPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
    pub fn lipschitz_factor(mut self, factor: f64) -> Self {
        self.lipschitz_factor = Some(factor);
        self
    }
    pub fn min_lipschitz(mut self, value: f64) -> Self {
        self.min_lipschitz = Some(value);
        self
    }
    pub fn max_corner_dims(mut self, dims: usize) -> Self {
        self.max_corner_dims = Some(dims);
        self
    }
    pub fn max_frontier(mut self, boxes: usize) -> Self {
        self.max_frontier = Some(boxes);
        self
    }
    pub fn max_refinement_rounds(mut self, rounds: usize) -> Self {
        self.max_refinement_rounds = Some(rounds);
        self
    }
    pub fn prune_tolerance(mut self, tolerance: f64) -> Self {
        self.prune_tolerance = Some(tolerance);
        self
    }
    pub fn polish(mut self, enabled: bool) -> Self {
        self.polish_enabled = Some(enabled);
        self
    }
    pub fn max_polish_rounds(mut self, rounds: usize) -> Self {
        self.max_polish_rounds = Some(rounds);
        self
    }
    pub fn max_polish_iterations(mut self, iterations: usize) -> Self {
        self.max_polish_iterations = Some(iterations);
        self
    }
    pub fn energy_tolerance(mut self, tolerance: f64) -> Self {
        self.energy_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> Result<EquilibriumConfig, ConfigError> {
        let sampling_defaults = SamplingConfig::default();
        let hull_defaults = HullConfig::default();
        let refinement_defaults = RefinementConfig::default();
        let polish_defaults = PolishConfig::default();

        let config = EquilibriumConfig {
            sampling: SamplingConfig {
                density: self.density.unwrap_or(sampling_defaults.density),
                seed: self.seed.unwrap_or(sampling_defaults.seed),
                grid_budget_factor: self
                    .grid_budget_factor
                    .unwrap_or(sampling_defaults.grid_budget_factor),
            },
            hull: HullConfig {
                epsilon: self.epsilon.unwrap_or(hull_defaults.epsilon),
                max_tie_candidates: self
                    .max_tie_candidates
                    .unwrap_or(hull_defaults.max_tie_candidates),
                merge_distance: self.merge_distance.unwrap_or(hull_defaults.merge_distance),
                max_simplex_iterations: self
                    .max_simplex_iterations
                    .unwrap_or(hull_defaults.max_simplex_iterations),
            },
            refinement: RefinementConfig {
                policy: self.policy.unwrap_or(refinement_defaults.policy),
                resolution: self.resolution.unwrap_or(refinement_defaults.resolution),
                max_depth: self.max_depth.unwrap_or(refinement_defaults.max_depth),
                lipschitz_factor: self
                    .lipschitz_factor
                    .unwrap_or(refinement_defaults.lipschitz_factor),
                min_lipschitz: self.min_lipschitz.unwrap_or(refinement_defaults.min_lipschitz),
                max_corner_dims: self
                    .max_corner_dims
                    .unwrap_or(refinement_defaults.max_corner_dims),
                max_frontier: self.max_frontier.unwrap_or(refinement_defaults.max_frontier),
                max_rounds: self
                    .max_refinement_rounds
                    .unwrap_or(refinement_defaults.max_rounds),
                prune_tolerance: self
                    .prune_tolerance
                    .unwrap_or(refinement_defaults.prune_tolerance),
            },
            polish: PolishConfig {
                enabled: self.polish_enabled.unwrap_or(polish_defaults.enabled),
                max_rounds: self.max_polish_rounds.unwrap_or(polish_defaults.max_rounds),
                max_iterations: self
                    .max_polish_iterations
                    .unwrap_or(polish_defaults.max_iterations),
                energy_tolerance: self
                    .energy_tolerance
                    .unwrap_or(polish_defaults.energy_tolerance),
            },
        };
        config.validate()?;
        Ok(config)
    }
}
