//! Value models: the per-key estimators a registry holds.
//!
//! Two families share one interface so the agent can run either:
//! - [`NetworkValueModel`] generalises over the context vector
//! - [`TabularValueModel`] is a direct state → value lookup, no backprop

use phatic_core::config::check_topology;
use phatic_core::{LearningError, ModelKind, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::network::ValueNetwork;
use crate::persistence::{TokenReader, TokenWriter};

/// What a model gets to look at for one estimate.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub state: &'a str,
    pub context: &'a [f64],
}

impl<'a> Observation<'a> {
    pub fn new(state: &'a str, context: &'a [f64]) -> Self {
        Self { state, context }
    }
}

/// Trait for estimators of "how good is this key right now".
pub trait ValueModel: Debug + Send {
    fn kind(&self) -> ModelKind;

    /// Current estimate for the observation.
    fn evaluate(&mut self, obs: &Observation<'_>) -> Result<f64>;

    /// Move the estimate for the observation toward `target`.
    fn train(&mut self, obs: &Observation<'_>, target: f64) -> Result<()>;

    /// Context width this model reads, if it reads the context at all.
    fn input_width(&self) -> Option<usize>;

    fn write_tokens(&self, out: &mut TokenWriter<'_>) -> Result<()>;
}

/// A [`ValueNetwork`] scoring the context vector; the state is ignored.
#[derive(Debug, Clone)]
pub struct NetworkValueModel {
    network: ValueNetwork,
}

impl NetworkValueModel {
    pub fn new(network: ValueNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &ValueNetwork {
        &self.network
    }

    pub fn into_network(self) -> ValueNetwork {
        self.network
    }
}

impl ValueModel for NetworkValueModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Network
    }

    fn evaluate(&mut self, obs: &Observation<'_>) -> Result<f64> {
        self.network.evaluate(obs.context)
    }

    fn train(&mut self, obs: &Observation<'_>, target: f64) -> Result<()> {
        self.network.train(obs.context, target)
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.network.input_width())
    }

    fn write_tokens(&self, out: &mut TokenWriter<'_>) -> Result<()> {
        self.network.write_tokens(out)
    }
}

/// Direct state → value table. Unseen states are worth 0.
#[derive(Debug, Clone, Default)]
pub struct TabularValueModel {
    values: BTreeMap<String, f64>,
}

impl TabularValueModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, state: &str) -> f64 {
        self.values.get(state).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `<count> (<state> <value>)...`
    pub fn read_tokens(input: &mut TokenReader<'_>) -> Result<Self> {
        let count = input.usize()?;
        let mut values = BTreeMap::new();
        for _ in 0..count {
            let state = input.token()?.to_string();
            let value = input.f64()?;
            values.insert(state, value);
        }
        Ok(Self { values })
    }
}

impl ValueModel for TabularValueModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Tabular
    }

    fn evaluate(&mut self, obs: &Observation<'_>) -> Result<f64> {
        Ok(self.value(obs.state))
    }

    /// The TD target already blends old and new value, so it is stored as is.
    fn train(&mut self, obs: &Observation<'_>, target: f64) -> Result<()> {
        self.values.insert(obs.state.to_string(), target);
        Ok(())
    }

    fn input_width(&self) -> Option<usize> {
        None
    }

    fn write_tokens(&self, out: &mut TokenWriter<'_>) -> Result<()> {
        out.usize(self.values.len())?;
        for (state, value) in &self.values {
            out.token(state)?;
            out.f64(*value)?;
        }
        Ok(())
    }
}

/// Recipe for the models a registry creates and reads back.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    Network { topology: Vec<usize> },
    Tabular,
}

impl ModelSpec {
    pub fn network(topology: Vec<usize>) -> Result<Self> {
        check_topology(&topology).map_err(LearningError::InvalidTopology)?;
        Ok(ModelSpec::Network { topology })
    }

    pub fn for_kind(kind: ModelKind, topology: &[usize]) -> Result<Self> {
        match kind {
            ModelKind::Network => Self::network(topology.to_vec()),
            ModelKind::Tabular => Ok(ModelSpec::Tabular),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::Network { .. } => ModelKind::Network,
            ModelSpec::Tabular => ModelKind::Tabular,
        }
    }

    pub fn build<R: Rng>(&self, rng: &mut R) -> Result<Box<dyn ValueModel>> {
        Ok(match self {
            ModelSpec::Network { topology } => {
                Box::new(NetworkValueModel::new(ValueNetwork::new(topology, rng)?))
            }
            ModelSpec::Tabular => Box::new(TabularValueModel::new()),
        })
    }

    /// Read one persisted model of this kind. Persisted networks keep
    /// their own topology.
    pub fn read(&self, input: &mut TokenReader<'_>) -> Result<Box<dyn ValueModel>> {
        Ok(match self {
            ModelSpec::Network { .. } => {
                Box::new(NetworkValueModel::new(ValueNetwork::read_tokens(input)?))
            }
            ModelSpec::Tabular => Box::new(TabularValueModel::read_tokens(input)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tabular_defaults_to_zero() {
        let mut model = TabularValueModel::new();
        let ctx = [0.0; 4];
        assert_eq!(model.evaluate(&Observation::new("s", &ctx)).unwrap(), 0.0);
    }

    #[test]
    fn test_tabular_train_stores_target() {
        let mut model = TabularValueModel::new();
        let ctx = [0.0; 4];
        let obs = Observation::new("s", &ctx);
        model.train(&obs, 0.75).unwrap();
        assert_eq!(model.evaluate(&obs).unwrap(), 0.75);
        assert_eq!(model.value("other"), 0.0);
    }

    #[test]
    fn test_tabular_token_roundtrip() {
        let mut model = TabularValueModel::new();
        let ctx = [0.0; 1];
        model.train(&Observation::new("alpha", &ctx), -0.5).unwrap();
        model.train(&Observation::new("beta", &ctx), 1.25).unwrap();

        let mut buf = Vec::new();
        model.write_tokens(&mut TokenWriter::new(&mut buf)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "2 alpha -0.5 beta 1.25");

        let restored = TabularValueModel::read_tokens(&mut TokenReader::new(&text)).unwrap();
        assert_eq!(restored.value("alpha"), -0.5);
        assert_eq!(restored.value("beta"), 1.25);
    }

    #[test]
    fn test_network_model_ignores_state() {
        let mut rng = StdRng::seed_from_u64(2);
        let spec = ModelSpec::network(vec![3, 2, 1]).unwrap();
        let mut model = spec.build(&mut rng).unwrap();
        let ctx = [0.2, 0.4, 0.6];
        let a = model.evaluate(&Observation::new("a", &ctx)).unwrap();
        let b = model.evaluate(&Observation::new("b", &ctx)).unwrap();
        assert_eq!(a, b);
        assert_eq!(model.input_width(), Some(3));
        assert_eq!(model.kind(), ModelKind::Network);
    }

    #[test]
    fn test_spec_for_kind() {
        assert_eq!(
            ModelSpec::for_kind(ModelKind::Tabular, &[8, 1]).unwrap(),
            ModelSpec::Tabular
        );
        assert!(ModelSpec::for_kind(ModelKind::Network, &[8, 2]).is_err());
    }
}
