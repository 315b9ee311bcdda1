//! phatic_bench: trajectory simulation tests for the move learner.
//!
//! Validates emergent behavior over long synthetic dialogues:
//! - Optimistic exploration sweeps every move before exploiting
//! - Visit decay and reset reopen exploration
//! - A deterministic call-and-response is learned with bounded mistakes
//! - Long runs stay numerically sane and reproducible

use phatic_core::{MoveKey, MoveWindow, Result};
use phatic_learning::QLearningAgent;

/// One simulated turn: what the agent predicted and the reward it got for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub predicted: MoveKey,
    pub reward: f64,
}

/// Feed `script` to the agent with a fixed state and context. Stops at the
/// first failing step.
pub fn simulate_fixed(
    agent: &mut QLearningAgent,
    script: impl IntoIterator<Item = MoveKey>,
    state: &str,
    context: &[f64],
) -> Result<Vec<Turn>> {
    script
        .into_iter()
        .map(|observed| {
            let predicted = agent.step(&observed, state, context)?;
            Ok(Turn {
                predicted,
                reward: agent.reward().unwrap_or_default(),
            })
        })
        .collect()
}

/// Feed `script` to the agent, deriving the state from a window of the most
/// recent `window` moves.
pub fn simulate_windowed(
    agent: &mut QLearningAgent,
    script: impl IntoIterator<Item = MoveKey>,
    window: usize,
    context: &[f64],
) -> Result<Vec<Turn>> {
    let mut recent = MoveWindow::new(window);
    script
        .into_iter()
        .map(|observed| {
            recent.push(observed.clone());
            let predicted = agent.step(&observed, &recent.signature(), context)?;
            Ok(Turn {
                predicted,
                reward: agent.reward().unwrap_or_default(),
            })
        })
        .collect()
}
