//! Single-step Q-learning over conversational moves.
//!
//! Every call to [`QLearningAgent::step`] is one TD(0) transition:
//! 1. Score the previous prediction against the move that actually came
//! 2. Refine the value models of the previous move and feeling toward
//!    `reward + γ · max Q(now)`
//! 3. Pick the next move and feeling, optimistic about anything tried
//!    fewer than `exploration_threshold` times in the current state
//!
//! The agent is single-threaded; hosts that share one across threads wrap
//! it in a mutex.

use phatic_core::{
    AgentConfig, FeelingTag, LearningError, MoveKey, PhaticConfig, Result, StateSignature,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::frequency::VisitFrequencyTable;
use crate::model::{ModelSpec, Observation};
use crate::persistence::{read_agent_file, write_agent_file};
use crate::registry::ValueModelRegistry;

/// Whether the agent has seen a step yet. Never goes back to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Uninitialized,
    Steady,
}

/// Everything the agent remembers about its previous step.
#[derive(Debug, Clone)]
pub struct AgentMemory {
    pub state: StateSignature,
    pub action: MoveKey,
    pub feeling: FeelingTag,
    pub reward: f64,
    pub context: Vec<f64>,
}

/// How decisive the last move selection was.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionStats {
    /// Moves that competed
    pub candidates: usize,
    /// Raw estimate of the chosen move (before exploration scoring)
    pub chosen_value: f64,
    /// (chosen − mean) / (max − min) over raw estimates; 0 when all equal
    pub relevance: f64,
    /// Refinement rounds the TD update ran
    pub refinement_rounds: usize,
    /// TD error of the final refinement round
    pub td_error: f64,
}

/// Step size for the n-th visit: 1/(n+1).
pub fn learning_rate(visits: u64) -> f64 {
    1.0 / (visits as f64 + 1.0)
}

/// Optimistic exploration: anything visited fewer than `threshold` times
/// scores `max_reward` whatever its estimate.
pub fn exploration_score(value: f64, visits: u64, threshold: u64, max_reward: f64) -> f64 {
    if visits < threshold {
        max_reward
    } else {
        value
    }
}

/// Index of the best score. Ties go to the candidate scanned last.
fn select_index(scores: impl Iterator<Item = f64>) -> Option<usize> {
    let mut best = f64::MIN;
    let mut chosen = None;
    for (i, score) in scores.enumerate() {
        if score >= best {
            best = score;
            chosen = Some(i);
        }
    }
    chosen
}

fn relevance(values: &[f64], chosen: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (lo, hi) = values
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi - lo <= 0.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (chosen - mean) / (hi - lo)
}

pub struct QLearningAgent {
    config: AgentConfig,
    input_width: usize,
    moves: ValueModelRegistry<MoveKey>,
    feelings: ValueModelRegistry<FeelingTag>,
    visits: VisitFrequencyTable<MoveKey>,
    feeling_visits: VisitFrequencyTable<FeelingTag>,
    memory: Option<AgentMemory>,
    last_selection: Option<SelectionStats>,
    rng: StdRng,
}

impl QLearningAgent {
    /// Build an agent and seed its feeling registry with random labels.
    pub fn new(config: &PhaticConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.agent.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let kind = config.agent.model;
        let mut feelings = ValueModelRegistry::new(ModelSpec::for_kind(
            kind,
            &config.feelings.topology,
        )?);
        for _ in 0..config.feelings.seed_count {
            let label: FeelingTag = (0..config.feelings.label_len)
                .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                .collect();
            feelings.ensure(&label, &mut rng)?;
        }

        Ok(Self {
            config: config.agent.clone(),
            input_width: config.input_width(),
            moves: ValueModelRegistry::new(ModelSpec::for_kind(kind, &config.network.topology)?),
            feelings,
            visits: VisitFrequencyTable::new(),
            feeling_visits: VisitFrequencyTable::new(),
            memory: None,
            last_selection: None,
            rng,
        })
    }

    /// Build an agent and restore its move models and visit counts from `path`.
    pub fn from_file<P: AsRef<Path>>(config: &PhaticConfig, path: P) -> Result<Self> {
        let mut agent = Self::new(config)?;
        agent.load(path)?;
        Ok(agent)
    }

    /// Learn from `observed` and predict the next move.
    ///
    /// `state` summarises the conversation so far and `context` is its
    /// numeric rendering; both are only compared, never interpreted.
    pub fn step(&mut self, observed: &MoveKey, state: &str, context: &[f64]) -> Result<MoveKey> {
        if context.len() != self.input_width {
            return Err(LearningError::DimensionMismatch {
                expected: self.input_width,
                actual: context.len(),
            });
        }

        // Loaded entries keep their persisted width; refuse before touching anything.
        self.moves.check_input_width(context.len())?;
        self.feelings.check_input_width(context.len())?;

        let reward = match &self.memory {
            Some(prev) if prev.action == *observed => self.config.max_reward,
            _ => self.config.min_reward(),
        };

        self.moves.ensure(observed, &mut self.rng)?;

        let (action, feeling) = match self.memory.take() {
            None => {
                let feeling = self.feelings.keys().first().cloned().unwrap_or_default();
                (observed.clone(), feeling)
            }
            Some(prev) => match self.learn_and_select(&prev, reward, state, context) {
                Ok(choice) => choice,
                Err(e) => {
                    self.memory = Some(prev);
                    return Err(e);
                }
            },
        };

        self.memory = Some(AgentMemory {
            state: state.to_string(),
            action: action.clone(),
            feeling,
            reward,
            context: context.to_vec(),
        });
        Ok(action)
    }

    fn learn_and_select(
        &mut self,
        prev: &AgentMemory,
        reward: f64,
        state: &str,
        context: &[f64],
    ) -> Result<(MoveKey, FeelingTag)> {
        let now = Observation::new(state, context);
        let before = Observation::new(&prev.state, &prev.context);

        let bootstrap = self.moves.evaluate_all(&now)?.unwrap_or_default();
        let bootstrap_feeling = self.feelings.evaluate_all(&now)?.unwrap_or_default();

        self.visits.increment(&prev.action, &prev.state);
        self.feeling_visits.increment(&prev.feeling, &prev.state);

        let action_handle = self.moves.ensure(&prev.action, &mut self.rng)?;
        let feeling_handle = self.feelings.ensure(&prev.feeling, &mut self.rng)?;
        let alpha = learning_rate(self.visits.get(&prev.action, &prev.state));
        let alpha_feeling = learning_rate(self.feeling_visits.get(&prev.feeling, &prev.state));
        let gamma = self.config.discount;

        let mut last_error: Option<f64> = None;
        let mut rounds = 0;
        let mut td_error = 0.0;
        for round in 0..self.config.max_refinement_rounds {
            rounds = round + 1;

            let (estimate, target) = match self.moves.model_mut(action_handle) {
                Some(model) => {
                    let estimate = model.evaluate(&before)?;
                    let target = estimate + alpha * (reward + gamma * bootstrap - estimate);
                    model.train(&before, target)?;
                    (estimate, target)
                }
                None => break,
            };

            if let Some(model) = self.feelings.model_mut(feeling_handle) {
                let estimate_f = model.evaluate(&before)?;
                let target_f =
                    estimate_f + alpha_feeling * (reward + gamma * bootstrap_feeling - estimate_f);
                model.train(&before, target_f)?;
                tracing::debug!(
                    "Feeling TD error {:.6} (target {:.6}, estimate {:.6})",
                    target_f - estimate_f,
                    target_f,
                    estimate_f
                );
            }

            td_error = target - estimate;
            tracing::debug!(
                "Round {}: TD error {:.6} (target {:.6}, estimate {:.6})",
                rounds,
                td_error,
                target,
                estimate
            );

            if let Some(last) = last_error {
                if (last - td_error).abs() <= self.config.convergence_epsilon {
                    break;
                }
            }
            last_error = Some(td_error);
        }

        let threshold = self.config.exploration_threshold;
        let max_reward = self.config.max_reward;

        let move_values = self.moves.evaluate_each(&now)?;
        let move_idx = select_index(move_values.iter().zip(self.moves.keys()).map(|(&v, key)| {
            exploration_score(v, self.visits.get(key, state), threshold, max_reward)
        }));

        let feeling_values = self.feelings.evaluate_each(&now)?;
        let feeling_idx =
            select_index(feeling_values.iter().zip(self.feelings.keys()).map(|(&v, key)| {
                exploration_score(v, self.feeling_visits.get(key, state), threshold, max_reward)
            }));

        // Every value is NaN only if the models have diverged; keep the last prediction.
        let action = move_idx
            .map(|i| self.moves.keys()[i].clone())
            .unwrap_or_else(|| prev.action.clone());
        let feeling = feeling_idx
            .map(|i| self.feelings.keys()[i].clone())
            .unwrap_or_else(|| prev.feeling.clone());

        let chosen_value = move_idx.map_or(f64::NAN, |i| move_values[i]);
        self.last_selection = Some(SelectionStats {
            candidates: move_values.len(),
            chosen_value,
            relevance: relevance(&move_values, chosen_value),
            refinement_rounds: rounds,
            td_error,
        });
        tracing::trace!("Selected {} / {} among {} moves", action, feeling, move_values.len());

        Ok((action, feeling))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> AgentPhase {
        if self.memory.is_some() {
            AgentPhase::Steady
        } else {
            AgentPhase::Uninitialized
        }
    }

    pub fn memory(&self) -> Option<&AgentMemory> {
        self.memory.as_ref()
    }

    /// Reward earned by the most recent step.
    pub fn reward(&self) -> Option<f64> {
        self.memory.as_ref().map(|m| m.reward)
    }

    /// Feeling chosen by the most recent step.
    pub fn feeling(&self) -> Option<&FeelingTag> {
        self.memory.as_ref().map(|m| &m.feeling)
    }

    pub fn last_selection(&self) -> Option<&SelectionStats> {
        self.last_selection.as_ref()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn max_reward(&self) -> f64 {
        self.config.max_reward
    }

    pub fn min_reward(&self) -> f64 {
        self.config.min_reward()
    }

    pub fn exploration_threshold(&self) -> u64 {
        self.config.exploration_threshold
    }

    pub fn set_exploration_threshold(&mut self, threshold: u64) {
        self.config.exploration_threshold = threshold;
    }

    pub fn learning_rate(&self, visits: u64) -> f64 {
        learning_rate(visits)
    }

    pub fn exploration_score(&self, value: f64, visits: u64) -> f64 {
        exploration_score(
            value,
            visits,
            self.config.exploration_threshold,
            self.config.max_reward,
        )
    }

    pub fn move_registry(&self) -> &ValueModelRegistry<MoveKey> {
        &self.moves
    }

    pub fn feeling_registry(&self) -> &ValueModelRegistry<FeelingTag> {
        &self.feelings
    }

    pub fn visit_frequencies(&self) -> &VisitFrequencyTable<MoveKey> {
        &self.visits
    }

    pub fn feeling_frequencies(&self) -> &VisitFrequencyTable<FeelingTag> {
        &self.feeling_visits
    }

    /// Add a host-defined feeling; no-op if already registered.
    pub fn register_feeling(&mut self, tag: impl Into<FeelingTag>) -> Result<()> {
        self.feelings.ensure(&tag.into(), &mut self.rng)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Exploration memory maintenance
    // ------------------------------------------------------------------

    /// Forget how often moves were tried, making every move novel again.
    pub fn reset_visits(&mut self) {
        self.visits.reset();
    }

    /// Scale move visit counts by `factor`, truncating.
    pub fn scale_visits(&mut self, factor: f64) {
        self.visits.scale(factor);
    }

    /// Scale move visit counts by the configured `visit_decay`.
    pub fn decay_visits(&mut self) {
        self.visits.scale(self.config.visit_decay);
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write move models and move visit counts to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        tracing::info!("Saving agent to {}", path.display());
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // Written beside the target and renamed over it, so a failed save
        // leaves the previous file intact.
        let mut staged = NamedTempFile::new_in(dir)?;
        {
            let mut out = BufWriter::new(staged.as_file_mut());
            self.save_to(&mut out)?;
            out.flush()?;
        }
        staged.persist(path).map_err(|e| LearningError::Io(e.error))?;
        Ok(())
    }

    pub fn save_to(&self, out: &mut dyn Write) -> Result<()> {
        write_agent_file(out, &self.moves, &self.visits)
    }

    /// Restore move models and visit counts from `path`.
    ///
    /// The file is parsed completely before anything is applied, so a
    /// corrupt file leaves the agent untouched.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        tracing::info!("Loading agent from {}", path.display());
        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|e| LearningError::PersistenceCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.load_from_str(&text).map_err(|e| e.at_path(path))
    }

    pub fn load_from_str(&mut self, text: &str) -> Result<()> {
        let file = read_agent_file(text, self.moves.spec())?;

        for (key, model) in file.models {
            if let Some(width) = model.input_width() {
                if width != self.input_width {
                    tracing::warn!(
                        "Loaded model for {} reads {} inputs, agent feeds {}",
                        key,
                        width,
                        self.input_width
                    );
                }
            }
            self.moves.insert(key, model);
        }
        for (key, state, count) in file.visits {
            self.visits.set(&key, &state, count);
        }
        Ok(())
    }
}
