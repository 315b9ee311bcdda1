//! Conversational moves and the signatures built from them.
//!
//! A move is the symbolic form of one utterance, `subject.predicate(object)`.
//! The learner never looks inside a move beyond equality; ordering exists
//! only so moves can key ordered maps.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Free-form affective label attached to a selection.
pub type FeelingTag = String;

/// Opaque summary of recent history, used purely as a map key.
pub type StateSignature = String;

/// A candidate conversational action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoveKey {
    subject: String,
    predicate: String,
    object: String,
}

impl MoveKey {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    /// The three components in persisted order.
    pub fn parts(&self) -> [&str; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

impl fmt::Display for MoveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({});", self.subject, self.predicate, self.object)
    }
}

/// Bounded window over the most recent moves of a conversation.
///
/// Hosts use it to derive the state signature handed to the agent: the
/// concatenation of every remembered move, oldest first.
#[derive(Debug, Clone)]
pub struct MoveWindow {
    moves: VecDeque<MoveKey>,
    capacity: usize,
}

impl MoveWindow {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            moves: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Remember a move, forgetting the oldest one when full.
    pub fn push(&mut self, mv: MoveKey) {
        if self.moves.len() >= self.capacity {
            self.moves.pop_front();
        }
        self.moves.push_back(mv);
    }

    pub fn extend<I: IntoIterator<Item = MoveKey>>(&mut self, moves: I) {
        for mv in moves {
            self.push(mv);
        }
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &MoveKey> {
        self.moves.iter()
    }

    /// subject+predicate+object of every move, oldest first, no separators.
    pub fn signature(&self) -> StateSignature {
        let mut sig = String::new();
        for mv in &self.moves {
            for part in mv.parts() {
                sig.push_str(part);
            }
        }
        sig
    }
}

impl Default for MoveWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
