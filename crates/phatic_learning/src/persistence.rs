//! Whitespace-delimited text persistence.
//!
//! File layout (no version tag, no model-kind tag):
//!
//! ```text
//! <N> (<subject> <predicate> <object> <model tokens>)×N
//! <K> (<subject> <predicate> <object> <S> (<state> <count>)×S)×K
//! ```
//!
//! Network model tokens are `<layers> <width>... <weight>...` with weights in
//! (layer, output unit, input unit) order; tabular model tokens are
//! `<S> (<state> <value>)×S`. Floats are written in shortest round-trip form,
//! so a load reproduces the saved weights exactly.

use phatic_core::{LearningError, MoveKey, Result};
use std::io::Write;
use std::str::SplitWhitespace;

use crate::frequency::VisitFrequencyTable;
use crate::model::{ModelSpec, ValueModel};
use crate::registry::ValueModelRegistry;

/// Writes space-separated tokens, refusing anything that would not read back
/// as exactly one token.
pub struct TokenWriter<'a> {
    out: &'a mut dyn Write,
    line_started: bool,
}

impl<'a> TokenWriter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            line_started: false,
        }
    }

    pub fn token(&mut self, token: &str) -> Result<()> {
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(LearningError::UnencodableToken(token.to_string()));
        }
        self.raw(token)
    }

    pub fn usize(&mut self, n: usize) -> Result<()> {
        self.raw(&n.to_string())
    }

    pub fn u64(&mut self, n: u64) -> Result<()> {
        self.raw(&n.to_string())
    }

    pub fn f64(&mut self, x: f64) -> Result<()> {
        self.raw(&x.to_string())
    }

    pub fn newline(&mut self) -> Result<()> {
        writeln!(self.out)?;
        self.line_started = false;
        Ok(())
    }

    fn raw(&mut self, token: &str) -> Result<()> {
        if self.line_started {
            self.out.write_all(b" ")?;
        }
        self.out.write_all(token.as_bytes())?;
        self.line_started = true;
        Ok(())
    }
}

/// Pulls typed tokens off a text buffer. Every failure is a
/// [`LearningError::CorruptStream`] naming the token position.
pub struct TokenReader<'a> {
    tokens: SplitWhitespace<'a>,
    consumed: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            tokens: text.split_whitespace(),
            consumed: 0,
        }
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn token(&mut self) -> Result<&'a str> {
        let token = self.tokens.next().ok_or_else(|| {
            LearningError::CorruptStream(format!(
                "unexpected end of input after {} tokens",
                self.consumed
            ))
        })?;
        self.consumed += 1;
        Ok(token)
    }

    fn parsed<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.token()?;
        token.parse().map_err(|_| {
            LearningError::CorruptStream(format!(
                "expected {what} at token {}, found {token:?}",
                self.consumed
            ))
        })
    }

    pub fn usize(&mut self) -> Result<usize> {
        self.parsed("a count")
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.parsed("a visit count")
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.parsed("a number")
    }

    /// Fails if anything but whitespace is left.
    pub fn finish(mut self) -> Result<()> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(LearningError::CorruptStream(format!(
                "trailing data at token {}: {extra:?}",
                self.consumed + 1
            ))),
        }
    }
}

/// Logs save/load progress in steps of at least ten percent.
struct Progress {
    verb: &'static str,
    section: &'static str,
    total: usize,
    last_pct: usize,
}

impl Progress {
    fn new(verb: &'static str, section: &'static str, total: usize) -> Self {
        Self {
            verb,
            section,
            total,
            last_pct: 0,
        }
    }

    fn tick(&mut self, done: usize) {
        if self.total == 0 {
            return;
        }
        let pct = done * 100 / self.total;
        if pct > self.last_pct + 9 {
            tracing::info!("{} agent: {}% ({})", self.verb, pct, self.section);
            self.last_pct = pct;
        }
    }
}

fn write_move(out: &mut TokenWriter<'_>, key: &MoveKey) -> Result<()> {
    for part in key.parts() {
        out.token(part)?;
    }
    Ok(())
}

fn read_move(input: &mut TokenReader<'_>) -> Result<MoveKey> {
    let subject = input.token()?;
    let predicate = input.token()?;
    let object = input.token()?;
    Ok(MoveKey::new(subject, predicate, object))
}

/// Write the move registry followed by the move visit table.
///
/// The count opening the visit section is the number of distinct keys, not
/// the number of (key, state) pairs; each key carries its own state count.
pub fn write_agent_file(
    out: &mut dyn Write,
    moves: &ValueModelRegistry<MoveKey>,
    visits: &VisitFrequencyTable<MoveKey>,
) -> Result<()> {
    let mut out = TokenWriter::new(out);

    out.usize(moves.len())?;
    let mut progress = Progress::new("Saving", "value models", moves.len());
    for (i, (key, model)) in moves.iter().enumerate() {
        progress.tick(i);
        write_move(&mut out, key)?;
        model.write_tokens(&mut out)?;
    }
    out.newline()?;

    out.usize(visits.key_count())?;
    let mut progress = Progress::new("Saving", "frequency table", visits.key_count());
    for (i, (key, states)) in visits.iter().enumerate() {
        progress.tick(i);
        write_move(&mut out, key)?;
        out.usize(states.len())?;
        for (state, count) in states {
            out.token(state)?;
            out.u64(*count)?;
        }
    }
    out.newline()?;
    Ok(())
}

/// Everything an agent file holds, parsed but not yet applied.
#[derive(Debug)]
pub struct AgentFile {
    pub models: Vec<(MoveKey, Box<dyn ValueModel>)>,
    pub visits: Vec<(MoveKey, String, u64)>,
}

/// Parse a whole agent file. Models are read as `spec`'s kind.
pub fn read_agent_file(text: &str, spec: &ModelSpec) -> Result<AgentFile> {
    let mut input = TokenReader::new(text);

    let model_count = input.usize()?;
    let mut models = Vec::new();
    let mut progress = Progress::new("Loading", "value models", model_count);
    for i in 0..model_count {
        progress.tick(i);
        let key = read_move(&mut input)?;
        let model = spec.read(&mut input)?;
        models.push((key, model));
    }

    let key_count = input.usize()?;
    let mut visits = Vec::new();
    let mut progress = Progress::new("Loading", "frequency table", key_count);
    for i in 0..key_count {
        progress.tick(i);
        let key = read_move(&mut input)?;
        let state_count = input.usize()?;
        for _ in 0..state_count {
            let state = input.token()?.to_string();
            let count = input.u64()?;
            visits.push((key.clone(), state, count));
        }
    }

    input.finish()?;
    Ok(AgentFile { models, visits })
}
