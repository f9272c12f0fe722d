//! Configuration of the replay engine.
use crate::ReplayError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

fn default_name() -> String {
    "replay".to_string()
}

fn default_fetch_queue_size() -> usize {
    10
}

fn default_exp_queue_size() -> usize {
    10000
}

fn default_evict_interval() -> f32 {
    1.0
}

fn default_backoff_ms() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    50
}

/// Configuration of the replay engine.
///
/// `batch_size` has no default; the remaining fields fall back to their
/// defaults when omitted from a YAML file.
///
/// ```rust
/// use border_replay_core::ReplayConfig;
///
/// let config = ReplayConfig::new(32)
///     .fetch_queue_size(4)
///     .exp_queue_size(1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayConfig {
    /// Name of the store queue that producers push records to.
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of records in a sampled batch.
    pub batch_size: usize,

    /// Maximum number of prefetched batches.
    #[serde(default = "default_fetch_queue_size")]
    pub fetch_queue_size: usize,

    /// Maximum number of records pulled from the store but not yet inserted.
    #[serde(default = "default_exp_queue_size")]
    pub exp_queue_size: usize,

    /// Default interval of the eviction thread in seconds.
    #[serde(default = "default_evict_interval")]
    pub evict_interval: f32,

    /// Delay before retrying after an empty store queue, an unmet sampling
    /// condition or a failure, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Slice of time a blocked thread waits before checking its stop flag,
    /// in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ReplayConfig {
    /// Creates a configuration with the given batch size and default values elsewhere.
    pub fn new(batch_size: usize) -> Self {
        Self {
            name: default_name(),
            batch_size,
            fetch_queue_size: default_fetch_queue_size(),
            exp_queue_size: default_exp_queue_size(),
            evict_interval: default_evict_interval(),
            backoff_ms: default_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    /// Sets the name of the store queue.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity of the prefetch buffer.
    pub fn fetch_queue_size(mut self, fetch_queue_size: usize) -> Self {
        self.fetch_queue_size = fetch_queue_size;
        self
    }

    /// Sets the capacity of the ingest buffer.
    pub fn exp_queue_size(mut self, exp_queue_size: usize) -> Self {
        self.exp_queue_size = exp_queue_size;
        self
    }

    /// Sets the default interval of the eviction thread in seconds.
    pub fn evict_interval(mut self, evict_interval: f32) -> Self {
        self.evict_interval = evict_interval;
        self
    }

    /// Sets the retry delay in milliseconds.
    pub fn backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Sets the wait slice at blocking boundaries in milliseconds.
    pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Retry delay.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Wait slice at blocking boundaries.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Checks that sizes are positive and the eviction interval is finite.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ReplayError::InvalidConfig("batch_size must be positive".into()).into());
        }
        if self.fetch_queue_size == 0 {
            return Err(
                ReplayError::InvalidConfig("fetch_queue_size must be positive".into()).into(),
            );
        }
        if self.exp_queue_size == 0 {
            return Err(
                ReplayError::InvalidConfig("exp_queue_size must be positive".into()).into(),
            );
        }
        if !(self.evict_interval.is_finite() && self.evict_interval >= 0.0) {
            return Err(ReplayError::InvalidConfig(format!(
                "evict_interval must be a non-negative number, got {}",
                self.evict_interval
            ))
            .into());
        }
        Ok(())
    }

    /// Loads [`ReplayConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ReplayConfig`] to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
