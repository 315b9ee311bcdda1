//! # Phatic learning core
//!
//! Online value learning for picking the next conversational move.
//!
//! ## Pieces
//!
//! - [`ValueNetwork`]: small feed-forward net with hand-written backprop
//! - [`ValueModel`]: estimator interface, backed by a network or a table
//! - [`ValueModelRegistry`]: one model per move or feeling, grown on demand
//! - [`VisitFrequencyTable`]: how often each key was tried in each state
//! - [`QLearningAgent`]: the TD(0) controller tying them together
//!
//! The host turns a dialogue into a state signature and a context vector,
//! calls [`QLearningAgent::step`] once per observed move and reads back the
//! predicted move, feeling and reward.

pub mod agent;
pub mod frequency;
pub mod model;
pub mod network;
pub mod persistence;
pub mod registry;

pub use agent::{
    exploration_score, learning_rate, AgentMemory, AgentPhase, QLearningAgent, SelectionStats,
};
pub use frequency::VisitFrequencyTable;
pub use model::{ModelSpec, NetworkValueModel, Observation, TabularValueModel, ValueModel};
pub use network::{sigmoid, ValueNetwork};
pub use registry::{ModelHandle, ValueModelRegistry};
