//! The `dummy` resource: stateless arithmetic, with an optional artificial delay.
//!
//! Configuration:
//!
//! ```json
//! { "delay_ms": 0 }
//! ```
//!
//! Sums wrap on overflow.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::resource::Resource;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DummyConfig {
    delay_ms: u64,
}

pub struct DummyResource {
    config: Value,
    delay: Duration,
}

impl DummyResource {
    pub const TYPE_NAME: &'static str = "dummy";

    pub fn create(config: &Value) -> Result<Self> {
        let parsed: DummyConfig = match config {
            Value::Null => DummyConfig::default(),
            other => serde_json::from_value(other.clone())?,
        };
        Ok(Self {
            config: config.clone(),
            delay: Duration::from_millis(parsed.delay_ms),
        })
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait::async_trait]
impl Resource for DummyResource {
    fn name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    async fn compute_sum(&mut self, x: i32, y: i32) -> Result<i32> {
        self.pause().await;
        Ok(x.wrapping_add(y))
    }

    async fn compute_sums(&mut self, x: &[i32], y: &[i32]) -> Result<Vec<i32>> {
        self.pause().await;
        Ok(x.iter().zip(y).map(|(a, b)| a.wrapping_add(*b)).collect())
    }

    async fn destroy(&mut self) -> Result<()> {
        tracing::trace!("dummy resource destroyed");
        Ok(())
    }
}
