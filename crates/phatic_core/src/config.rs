use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LearningError;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaticConfig {
    pub agent: AgentConfig,
    pub network: NetworkConfig,
    pub feelings: FeelingConfig,
}

impl PhaticConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied and the result is validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: PhaticConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Try to load from path; if that fails, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PHATIC_EXPLORATION_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.agent.exploration_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("PHATIC_MAX_REWARD") {
            if let Ok(r) = v.parse() {
                self.agent.max_reward = r;
            }
        }
        if let Ok(v) = std::env::var("PHATIC_SEED") {
            if let Ok(seed) = v.parse() {
                self.agent.seed = Some(seed);
            }
        }
    }

    /// Width every context vector handed to the agent must have.
    pub fn input_width(&self) -> usize {
        self.network.topology.first().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> std::result::Result<(), LearningError> {
        let agent = &self.agent;
        if !agent.max_reward.is_finite() || agent.max_reward <= 0.0 {
            return Err(LearningError::Config("agent.max_reward must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&agent.discount) {
            return Err(LearningError::Config("agent.discount must be in [0, 1]".into()));
        }
        if agent.max_refinement_rounds == 0 {
            return Err(LearningError::Config(
                "agent.max_refinement_rounds must be >= 1".into(),
            ));
        }
        if agent.convergence_epsilon.is_nan() || agent.convergence_epsilon < 0.0 {
            return Err(LearningError::Config(
                "agent.convergence_epsilon must be >= 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&agent.visit_decay) {
            return Err(LearningError::Config("agent.visit_decay must be in [0, 1]".into()));
        }

        check_topology(&self.network.topology)
            .map_err(|e| LearningError::Config(format!("network.topology: {e}")))?;
        check_topology(&self.feelings.topology)
            .map_err(|e| LearningError::Config(format!("feelings.topology: {e}")))?;
        if self.network.topology[0] != self.feelings.topology[0] {
            return Err(LearningError::Config(
                "network.topology and feelings.topology must share the input width".into(),
            ));
        }

        if self.feelings.seed_count == 0 {
            return Err(LearningError::Config("feelings.seed_count must be >= 1".into()));
        }
        if self.feelings.label_len == 0 {
            return Err(LearningError::Config("feelings.label_len must be >= 1".into()));
        }
        Ok(())
    }

    /// TOML text with every default spelled out.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&PhaticConfig::default()).unwrap_or_default()
    }
}

/// A topology needs an input layer, a single output unit and no empty layer.
pub fn check_topology(topology: &[usize]) -> std::result::Result<(), String> {
    if topology.len() < 2 {
        return Err(format!("needs at least 2 layers, got {}", topology.len()));
    }
    if topology.iter().any(|&w| w == 0) {
        return Err("layer widths must be >= 1".into());
    }
    if topology[topology.len() - 1] != 1 {
        return Err(format!(
            "output layer must have exactly 1 unit, got {}",
            topology[topology.len() - 1]
        ));
    }
    Ok(())
}

// ============================================================================
// Sub-configs
// ============================================================================

/// Which value-model family backs every registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Network,
    Tabular,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Visits below which a candidate is scored as `max_reward` (default 30)
    pub exploration_threshold: u64,
    /// Reward for predicting the observed move; a miss earns its negation
    pub max_reward: f64,
    /// TD discount γ (default 0.2)
    pub discount: f64,
    pub max_refinement_rounds: usize,
    pub convergence_epsilon: f64,
    /// Factor used by `decay_visits` (default 0.65)
    pub visit_decay: f64,
    pub model: ModelKind,
    /// Fixed RNG seed for reproducible weights and feeling labels
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            exploration_threshold: 30,
            max_reward: 1.1,
            discount: 0.2,
            max_refinement_rounds: 10,
            convergence_epsilon: 1e-10,
            visit_decay: 0.65,
            model: ModelKind::Network,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn min_reward(&self) -> f64 {
        -self.max_reward
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Layer widths of newly created move networks (input first, output last)
    pub topology: Vec<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            topology: vec![10 * 80, 32, 1],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeelingConfig {
    /// Random feeling labels registered at construction
    pub seed_count: usize,
    /// Decimal digits per generated label
    pub label_len: usize,
    pub topology: Vec<usize>,
}

impl Default for FeelingConfig {
    fn default() -> Self {
        Self {
            seed_count: 10,
            label_len: 40,
            topology: vec![10 * 80, 16, 1],
        }
    }
}
