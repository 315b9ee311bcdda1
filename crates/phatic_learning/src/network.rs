//! Fixed-topology sigmoid perceptron that scores one candidate.
//!
//! Architecture: `topology[0]` inputs → hidden sigmoid layers → 1 output.
//! No biases. Trained one sample at a time with plain backpropagation.

use phatic_core::config::check_topology;
use phatic_core::{LearningError, Result};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::persistence::{TokenReader, TokenWriter};

/// Initial weights are drawn from `[-INIT_RANGE, INIT_RANGE)`.
const INIT_RANGE: f64 = 5.0;
/// Step size for the weights feeding the output unit.
const OUTPUT_RATE: f64 = 0.2;
/// Error scale and step size for every earlier layer.
const HIDDEN_RATE: f64 = 0.19;

/// A small MLP mapping a context vector to a value estimate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "NetworkSnapshot", into = "NetworkSnapshot")]
pub struct ValueNetwork {
    topology: Vec<usize>,
    /// One row-major matrix per layer transition: `topology[l + 1]` rows of
    /// `topology[l]` incoming weights.
    weights: Vec<Vec<f64>>,
    /// Activations of layers `1..`, refreshed by every forward pass.
    units: Vec<Vec<f64>>,
    /// Backpropagated errors, same shape as `units`.
    deltas: Vec<Vec<f64>>,
}

/// Serialized form: topology plus weights, buffers are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct NetworkSnapshot {
    topology: Vec<usize>,
    weights: Vec<Vec<f64>>,
}

impl ValueNetwork {
    /// Create with weights uniform in [-5, 5).
    pub fn new<R: Rng>(topology: &[usize], rng: &mut R) -> Result<Self> {
        check_topology(topology).map_err(LearningError::InvalidTopology)?;
        let sizes = transition_sizes(topology).ok_or_else(|| {
            LearningError::InvalidTopology(format!("weight count of {topology:?} overflows"))
        })?;
        let dist = Uniform::new(-INIT_RANGE, INIT_RANGE);
        let weights = sizes
            .into_iter()
            .map(|n| (0..n).map(|_| dist.sample(rng)).collect())
            .collect();
        Ok(Self::with_weights(topology.to_vec(), weights))
    }

    /// Rebuild from a topology and per-transition weight matrices.
    pub fn from_parts(topology: Vec<usize>, weights: Vec<Vec<f64>>) -> Result<Self> {
        check_topology(&topology).map_err(LearningError::InvalidTopology)?;
        if weights.len() != topology.len() - 1 {
            return Err(LearningError::InvalidTopology(format!(
                "{} layers need {} weight matrices, got {}",
                topology.len(),
                topology.len() - 1,
                weights.len()
            )));
        }
        let sizes = transition_sizes(&topology).ok_or_else(|| {
            LearningError::InvalidTopology(format!("weight count of {topology:?} overflows"))
        })?;
        for (l, (size, matrix)) in sizes.into_iter().zip(&weights).enumerate() {
            if matrix.len() != size {
                return Err(LearningError::InvalidTopology(format!(
                    "transition {l} needs {size} weights, got {}",
                    matrix.len()
                )));
            }
        }
        Ok(Self::with_weights(topology, weights))
    }

    fn with_weights(topology: Vec<usize>, weights: Vec<Vec<f64>>) -> Self {
        let units: Vec<Vec<f64>> = topology[1..].iter().map(|&w| vec![0.0; w]).collect();
        let deltas = units.clone();
        Self {
            topology,
            weights,
            units,
            deltas,
        }
    }

    pub fn topology(&self) -> &[usize] {
        &self.topology
    }

    pub fn input_width(&self) -> usize {
        self.topology[0]
    }

    pub fn weight_count(&self) -> usize {
        self.weights.iter().map(Vec::len).sum()
    }

    /// Weights of transition `layer` (into layer `layer + 1`), row-major.
    pub fn layer_weights(&self, layer: usize) -> Option<&[f64]> {
        self.weights.get(layer).map(Vec::as_slice)
    }

    /// Every weight in (layer, output unit, input unit) order.
    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights.iter().flat_map(|m| m.iter().copied())
    }

    fn check_input(&self, input: &[f64]) -> Result<()> {
        if input.len() != self.topology[0] {
            return Err(LearningError::DimensionMismatch {
                expected: self.topology[0],
                actual: input.len(),
            });
        }
        Ok(())
    }

    fn forward(&mut self, input: &[f64]) -> Result<()> {
        self.check_input(input)?;
        for l in 0..self.weights.len() {
            let (done, rest) = self.units.split_at_mut(l);
            let prev: &[f64] = if l == 0 { input } else { &done[l - 1] };
            let cols = prev.len();
            for (j, unit) in rest[0].iter_mut().enumerate() {
                let row = &self.weights[l][j * cols..(j + 1) * cols];
                let sum: f64 = row.iter().zip(prev).map(|(w, x)| w * x).sum();
                *unit = sigmoid(sum);
            }
        }
        Ok(())
    }

    /// Stored activation of the output unit after the last forward pass.
    fn output(&self) -> f64 {
        self.units.last().map_or(0.0, |out| out[0])
    }

    /// Forward pass: context → value estimate.
    ///
    /// The output activation is squashed a second time on read; callers and
    /// `train` both rely on that scale.
    pub fn evaluate(&mut self, context: &[f64]) -> Result<f64> {
        self.forward(context)?;
        Ok(sigmoid(self.output()))
    }

    /// One backpropagation step pulling the estimate for `context` toward `target`.
    pub fn train(&mut self, context: &[f64], target: f64) -> Result<()> {
        self.forward(context)?;

        let last = self.weights.len() - 1;
        for (j, delta) in self.deltas[last].iter_mut().enumerate() {
            let out = self.units[last][j];
            let squashed = sigmoid(out);
            *delta = squashed * (1.0 - squashed) * (target - out);
        }
        let prev: &[f64] = if last == 0 { context } else { &self.units[last - 1] };
        apply_update(&mut self.weights[last], &self.deltas[last], prev, OUTPUT_RATE);

        // Errors flow back through weights the previous iteration already moved.
        for i in (0..last).rev() {
            let width = self.units[i].len();
            for j in 0..width {
                let sum: f64 = self.deltas[i + 1]
                    .iter()
                    .enumerate()
                    .map(|(l, d)| HIDDEN_RATE * self.weights[i + 1][l * width + j] * d)
                    .sum();
                let squashed = sigmoid(self.units[i][j]);
                self.deltas[i][j] = squashed * (1.0 - squashed) * sum;
            }
            let prev: &[f64] = if i == 0 { context } else { &self.units[i - 1] };
            apply_update(&mut self.weights[i], &self.deltas[i], prev, HIDDEN_RATE);
        }
        Ok(())
    }

    /// `<layers> <width>... <weight>...`
    pub fn write_tokens(&self, out: &mut TokenWriter<'_>) -> Result<()> {
        out.usize(self.topology.len())?;
        for &width in &self.topology {
            out.usize(width)?;
        }
        for w in self.weights() {
            out.f64(w)?;
        }
        Ok(())
    }

    pub fn read_tokens(input: &mut TokenReader<'_>) -> Result<Self> {
        let layers = input.usize()?;
        if layers < 2 {
            return Err(LearningError::CorruptStream(format!(
                "network with {layers} layers"
            )));
        }
        let topology = (0..layers)
            .map(|_| input.usize())
            .collect::<Result<Vec<_>>>()?;
        check_topology(&topology).map_err(LearningError::CorruptStream)?;
        let sizes = transition_sizes(&topology).ok_or_else(|| {
            LearningError::CorruptStream(format!("weight count of {topology:?} overflows"))
        })?;
        let mut weights = Vec::with_capacity(sizes.len());
        for size in sizes {
            let matrix = (0..size)
                .map(|_| input.f64())
                .collect::<Result<Vec<_>>>()?;
            weights.push(matrix);
        }
        Ok(Self::with_weights(topology, weights))
    }

    /// Serialize to JSON for inspection.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl TryFrom<NetworkSnapshot> for ValueNetwork {
    type Error = LearningError;

    fn try_from(snapshot: NetworkSnapshot) -> Result<Self> {
        Self::from_parts(snapshot.topology, snapshot.weights)
    }
}

impl From<ValueNetwork> for NetworkSnapshot {
    fn from(network: ValueNetwork) -> Self {
        Self {
            topology: network.topology,
            weights: network.weights,
        }
    }
}

/// Weights per layer transition; `None` if a count does not fit in `usize`.
fn transition_sizes(topology: &[usize]) -> Option<Vec<usize>> {
    topology
        .windows(2)
        .map(|pair| pair[0].checked_mul(pair[1]))
        .collect()
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn apply_update(weights: &mut [f64], deltas: &[f64], prev: &[f64], rate: f64) {
    let cols = prev.len();
    for (j, &delta) in deltas.iter().enumerate() {
        for (w, &x) in weights[j * cols..(j + 1) * cols].iter_mut().zip(prev) {
            *w += rate * delta * x;
        }
    }
}
