//! # Configuration
//!
//! JSON configuration records for engines and providers.
//!
//! ```json
//! { "protocol": "sm", "mode": "server", "worker_threads": 2 }
//! { "resource": { "type": "dummy", "config": {} } }
//! ```

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;

/// Whether an engine accepts inbound connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transport selector, e.g. `"sm"` or `"na+sm"`.
    pub protocol: String,
    pub mode: Mode,
    /// Threads driving connections, handlers and timers.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: "sm".to_string(),
            mode: Mode::Server,
            worker_threads: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Construction record for a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub resource: ResourceSpec,
}

/// Which resource a provider serves and how to build it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific parameters, handed to the resource constructor untouched.
    #[serde(default = "empty_object")]
    pub config: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl ProviderConfig {
    /// A config for `kind` with no type-specific parameters.
    pub fn for_type(kind: &str) -> Self {
        Self {
            resource: ResourceSpec { kind: kind.to_string(), config: empty_object() },
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if value.get("resource").and_then(|r| r.get("type")).and_then(Value::as_str).is_none() {
            return Err(Error::Configuration("resource.type must be a string".into()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> String {
        Value::from(self).to_string()
    }
}

impl From<&ProviderConfig> for Value {
    fn from(config: &ProviderConfig) -> Self {
        serde_json::json!({
            "resource": {
                "type": config.resource.kind,
                "config": config.resource.config,
            }
        })
    }
}
