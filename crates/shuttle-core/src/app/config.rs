//! EngineConfig - エンジンの設定
//!
//! Invalid values for individual fields fall back to their defaults with a
//! warning instead of failing construction. Only a document that is not a
//! JSON object at all is an error.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::ShuttleError;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long the result watcher sleeps when the result queue is empty.
    #[serde(deserialize_with = "lenient_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound for waiting on the worker thread during shutdown.
    #[serde(deserialize_with = "lenient_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,

    /// At shutdown, kill every process still recorded in the engine's
    /// `ProcessTracker`, with its descendants (needs a reaper). Other
    /// children of the host are left alone.
    #[serde(alias = "reap_descendants")]
    pub reap_task_processes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            reap_task_processes: false,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document such as `{"poll_interval_ms": 50}`.
    pub fn from_json(doc: &Value) -> Result<Self, ShuttleError> {
        if !doc.is_object() {
            return Err(ShuttleError::operation(format!(
                "engine config must be a JSON object, got {doc}"
            )));
        }
        serde_json::from_value(doc.clone())
            .map_err(|e| ShuttleError::operation(format!("invalid engine config: {e}")))
    }

    /// Set the poll interval from an untrusted integer.
    pub fn with_poll_interval(mut self, raw: i64) -> Self {
        self.poll_interval_ms = coerce_millis("poll_interval_ms", &Value::from(raw), DEFAULT_POLL_INTERVAL_MS);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_reap_task_processes(mut self, on: bool) -> Self {
        self.reap_task_processes = on;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn coerce_millis(field: &str, raw: &Value, default: u64) -> u64 {
    match raw.as_u64() {
        Some(ms) => ms,
        None => {
            warn!(target: "shuttle.config", field, value = %raw, default, "expected a non-negative integer; using default");
            default
        }
    }
}

fn lenient_poll_interval<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(coerce_millis("poll_interval_ms", &raw, DEFAULT_POLL_INTERVAL_MS))
}

fn lenient_shutdown_timeout<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(coerce_millis("shutdown_timeout_ms", &raw, DEFAULT_SHUTDOWN_TIMEOUT_MS))
}
