//! # Resources
//!
//! A resource is the stateful object a provider serves. Each resource type
//! implements the full operation set; the provider holds exactly one instance
//! and never calls into it from two handlers at once, so implementations take
//! `&mut self` and need no locking of their own.

use std::collections::HashMap;

use serde_json::Value;

use crate::dummy::DummyResource;
use crate::error::Error;
use crate::error::Result;

#[async_trait::async_trait]
pub trait Resource: Send + Sync + 'static {
    /// The type name this resource was created under.
    fn name(&self) -> &str;

    /// The type-specific configuration, as given at creation.
    fn config(&self) -> Value;

    async fn compute_sum(&mut self, x: i32, y: i32) -> Result<i32>;

    /// Pairwise sums. Callers guarantee `x.len() == y.len()`.
    async fn compute_sums(&mut self, x: &[i32], y: &[i32]) -> Result<Vec<i32>>;

    /// Releases whatever the resource holds. Called once, at provider teardown.
    async fn destroy(&mut self) -> Result<()>;
}

type CreateFn = Box<dyn Fn(&Value) -> Result<Box<dyn Resource>> + Send + Sync>;

/// Maps resource type names to constructors.
///
/// Owned by whoever creates providers; there is no global registration.
#[derive(Default)]
pub struct ResourceFactory {
    constructors: HashMap<String, CreateFn>,
}

impl ResourceFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that knows the resource types shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(DummyResource::TYPE_NAME, |config| {
            Ok(Box::new(DummyResource::create(config)?) as Box<dyn Resource>)
        });
        factory
    }

    /// Registers (or replaces) the constructor for `type_name`.
    pub fn register<F>(&mut self, type_name: &str, create: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Resource>> + Send + Sync + 'static,
    {
        self.constructors.insert(type_name.to_string(), Box::new(create));
    }

    pub fn knows(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn create(&self, type_name: &str, config: &Value) -> Result<Box<dyn Resource>> {
        let create = self
            .constructors
            .get(type_name)
            .ok_or_else(|| Error::Configuration(format!("Unknown resource type {}", type_name)))?;
        create(config)
    }
}
