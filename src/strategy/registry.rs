use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use crate::grid::{LadderError, LadderResult, PolicyConfig};

use super::presets;

/// Factory trait for building a policy from free-form parameters
pub trait PolicyFactory: Send + Sync {
    /// Build and validate a policy; unknown keys are ignored
    fn create(&self, params: &HashMap<String, Value>) -> LadderResult<PolicyConfig>;
}

impl<F> PolicyFactory for F
where
    F: Fn(&HashMap<String, Value>) -> LadderResult<PolicyConfig> + Send + Sync,
{
    fn create(&self, params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
        self(params)
    }
}

/// Registry for policy factories
pub struct PolicyRegistry {
    factories: HashMap<String, Box<dyn PolicyFactory>>,
}

impl PolicyRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in preset
    pub fn with_presets() -> Self {
        let mut registry = Self::new();
        registry.register("trend", presets::trend);
        registry.register("trend_martingale", presets::trend_martingale);
        registry.register("retracement", presets::retracement);
        registry.register("hedging", presets::hedging);
        registry.register("profit_trail", presets::profit_trail);
        registry
    }

    /// Register a policy factory, replacing any previous one with that name
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: PolicyFactory + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build the policy registered as `name`
    pub fn create(&self, name: &str, params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LadderError::UnknownPolicy(name.to_string()))?;
        let mut policy = factory.create(params)?;
        policy.name = name.to_string();
        policy.validate()?;
        debug!("Built policy '{}': {:?}", name, policy);
        Ok(policy)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}
