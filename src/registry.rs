//! Model registry
//!
//! The host discovers components by model name. Models are added with an
//! explicit `register_models` call during startup rather than at load time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::audio::backend::AudioBackend;
use crate::config::ComponentConfig;
use crate::error::{Error, Result};
use crate::sensor::{AudioIn, Sensor};

/// `namespace:family:name` model identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Model {
    pub namespace: String,
    pub family: String,
    pub name: String,
}

impl Model {
    pub fn new(
        namespace: impl Into<String>,
        family: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            family: family.into(),
            name: name.into(),
        }
    }

    /// The windowed microphone sensor
    pub fn audio_in() -> Self {
        Self::new("viam", "sensor", "audio-in")
    }

    /// Parse a `namespace:family:name` triplet
    pub fn parse(triplet: &str) -> Option<Self> {
        let mut parts = triplet.split(':');
        let (namespace, family, name) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || [namespace, family, name].iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self::new(namespace, family, name))
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.family, self.name)
    }
}

/// Builds a configured component from its config
pub type Constructor = Box<dyn Fn(&ComponentConfig) -> Result<Box<dyn Sensor>> + Send + Sync>;

/// Model name → constructor table
#[derive(Default)]
pub struct Registry {
    constructors: HashMap<Model, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor; each model can be registered once
    pub fn register(&mut self, model: Model, constructor: Constructor) -> Result<()> {
        if self.constructors.contains_key(&model) {
            return Err(Error::DuplicateModel(model.to_string()));
        }
        tracing::debug!(model = %model, "Registered model");
        self.constructors.insert(model, constructor);
        Ok(())
    }

    pub fn contains(&self, model: &Model) -> bool {
        self.constructors.contains_key(model)
    }

    /// Registered models, sorted by name
    pub fn models(&self) -> Vec<Model> {
        let mut models: Vec<Model> = self.constructors.keys().cloned().collect();
        models.sort_by_key(|m| m.to_string());
        models
    }

    /// Construct and configure the component described by `config`
    pub fn construct(&self, config: &ComponentConfig) -> Result<Box<dyn Sensor>> {
        let constructor = Model::parse(&config.model)
            .and_then(|model| self.constructors.get(&model))
            .ok_or_else(|| Error::UnknownModel(config.model.clone()))?;

        let sensor = constructor(config)?;
        tracing::info!(name = %config.name, model = %config.model, "Constructed component");
        Ok(sensor)
    }
}

/// Register every model this crate provides, backed by `backend`
pub fn register_models(registry: &mut Registry, backend: Arc<dyn AudioBackend>) -> Result<()> {
    registry.register(
        Model::audio_in(),
        Box::new(move |config: &ComponentConfig| {
            let sensor = AudioIn::from_config(config, Arc::clone(&backend))?;
            Ok(Box::new(sensor) as Box<dyn Sensor>)
        }),
    )
}
