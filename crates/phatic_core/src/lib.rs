//! # Phatic Core
//!
//! Vocabulary shared by every phatic crate:
//!
//! - **Moves**: structured `subject.predicate(object)` conversational actions
//! - **Feelings**: free-form affective tags attached to a selection
//! - **State signatures**: opaque strings summarising recent history
//! - **Configuration**: TOML-backed agent, network and feeling settings
//!
//! The learning engine itself lives in `phatic_learning`.

pub mod config;
pub mod error;
pub mod moves;

pub use config::{AgentConfig, FeelingConfig, ModelKind, NetworkConfig, PhaticConfig};
pub use error::{LearningError, Result};
pub use moves::{FeelingTag, MoveKey, MoveWindow, StateSignature};
