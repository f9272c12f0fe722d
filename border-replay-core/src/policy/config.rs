//! Configurations of the reference replay policies.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`FifoReplay`](super::FifoReplay).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct FifoReplayConfig {
    /// Maximum number of stored records.
    pub capacity: usize,

    /// Sampling starts once this many records are stored.
    pub start_sample_size: usize,
}

impl Default for FifoReplayConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            start_sample_size: 1,
        }
    }
}

impl FifoReplayConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of records required before sampling starts.
    pub fn start_sample_size(mut self, start_sample_size: usize) -> Self {
        self.start_sample_size = start_sample_size;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Configuration of [`UniformReplay`](super::UniformReplay).
///
/// ```rust
/// use border_replay_core::policy::UniformReplayConfig;
///
/// let config = UniformReplayConfig::default()
///     .capacity(100_000)
///     .start_sample_size(1_000)
///     .seed(7);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct UniformReplayConfig {
    /// Maximum number of stored records.
    /// When the buffer is full, a new record replaces the oldest one.
    pub capacity: usize,

    /// Sampling starts once this many records are stored.
    pub start_sample_size: usize,

    /// Random seed used for sampling.
    pub seed: u64,
}

impl Default for UniformReplayConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            start_sample_size: 1,
            seed: 42,
        }
    }
}

impl UniformReplayConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of records required before sampling starts.
    pub fn start_sample_size(mut self, start_sample_size: usize) -> Self {
        self.start_sample_size = start_sample_size;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
