//! Key → value model mapping that grows on demand.
//!
//! Models live in a handle-indexed arena; the registry only maps keys to
//! handles. Entries are never removed, so a handle stays valid for the
//! registry's whole life and insertion order is the arena order.

use phatic_core::{LearningError, Result};
use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;

use crate::model::{ModelSpec, Observation, ValueModel};

/// Dense index of a model inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(usize);

impl ModelHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct ValueModelRegistry<K> {
    spec: ModelSpec,
    index: HashMap<K, ModelHandle>,
    keys: Vec<K>,
    models: Vec<Box<dyn ValueModel>>,
}

impl<K: Clone + Eq + Hash> ValueModelRegistry<K> {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            index: HashMap::new(),
            keys: Vec::new(),
            models: Vec::new(),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Handle for `key`, creating a model from the registry's `ModelSpec` if needed.
    pub fn ensure<R: Rng>(&mut self, key: &K, rng: &mut R) -> Result<ModelHandle> {
        if let Some(&handle) = self.index.get(key) {
            return Ok(handle);
        }
        let model = self.spec.build(rng)?;
        tracing::trace!("Created {:?} model #{}", model.kind(), self.models.len());
        Ok(self.push(key.clone(), model))
    }

    pub fn get_or_create<R: Rng>(
        &mut self,
        key: &K,
        rng: &mut R,
    ) -> Result<&mut (dyn ValueModel + 'static)> {
        let handle = self.ensure(key, rng)?;
        Ok(&mut *self.models[handle.0])
    }

    /// Put `model` under `key`, replacing an existing model in place.
    pub fn insert(&mut self, key: K, model: Box<dyn ValueModel>) -> ModelHandle {
        match self.index.get(&key) {
            Some(&handle) => {
                self.models[handle.0] = model;
                handle
            }
            None => self.push(key, model),
        }
    }

    fn push(&mut self, key: K, model: Box<dyn ValueModel>) -> ModelHandle {
        let handle = ModelHandle(self.models.len());
        self.index.insert(key.clone(), handle);
        self.keys.push(key);
        self.models.push(model);
        handle
    }

    pub fn handle_of(&self, key: &K) -> Option<ModelHandle> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&(dyn ValueModel + 'static)> {
        self.handle_of(key).map(|h| &*self.models[h.0])
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut (dyn ValueModel + 'static)> {
        let handle = self.handle_of(key)?;
        Some(&mut *self.models[handle.0])
    }

    pub fn model_mut(&mut self, handle: ModelHandle) -> Option<&mut (dyn ValueModel + 'static)> {
        self.models.get_mut(handle.0).map(|m| &mut **m)
    }

    pub fn key(&self, handle: ModelHandle) -> Option<&K> {
        self.keys.get(handle.0)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &(dyn ValueModel + 'static))> {
        self.keys.iter().zip(self.models.iter().map(|m| &**m))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut (dyn ValueModel + 'static))> {
        self.keys
            .iter()
            .zip(self.models.iter_mut().map(|m| &mut **m))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Fails if any model reads a context of a width other than `width`.
    pub fn check_input_width(&self, width: usize) -> Result<()> {
        for model in &self.models {
            if let Some(expected) = model.input_width() {
                if expected != width {
                    return Err(LearningError::DimensionMismatch {
                        expected,
                        actual: width,
                    });
                }
            }
        }
        Ok(())
    }

    /// Estimate of every model, in insertion order.
    pub fn evaluate_each(&mut self, obs: &Observation<'_>) -> Result<Vec<f64>> {
        self.models.iter_mut().map(|m| m.evaluate(obs)).collect()
    }

    /// Best estimate over all registered models; `None` while empty.
    pub fn evaluate_all(&mut self, obs: &Observation<'_>) -> Result<Option<f64>> {
        let mut best: Option<f64> = None;
        for model in &mut self.models {
            let q = model.evaluate(obs)?;
            if best.map_or(true, |b| q > b) {
                best = Some(q);
            }
        }
        Ok(best)
    }
}
