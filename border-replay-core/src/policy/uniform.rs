//! Replay with uniform sampling.
use super::{ReplayPolicy, UniformReplayConfig};
use crate::{ExpRecord, ReplayError};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// Ring buffer of records sampled uniformly with replacement.
///
/// The oldest record is evicted when a new one would exceed the capacity.
/// Active eviction with `n` evicts the `n` oldest records.
pub struct UniformReplay {
    capacity: usize,
    start_sample_size: usize,
    records: VecDeque<ExpRecord>,
    rng: StdRng,
}

impl UniformReplay {
    /// Builds the policy.
    pub fn build(config: &UniformReplayConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            start_sample_size: config.start_sample_size,
            records: VecDeque::with_capacity(capacity),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }
}

impl ReplayPolicy for UniformReplay {
    type EvictArgs = usize;

    fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
        self.records.push_back(record);
        let mut evicted = vec![];
        while self.records.len() > self.capacity {
            evicted.extend(self.records.pop_front());
        }
        Ok(evicted)
    }

    fn sample(&mut self, n: usize) -> Result<Vec<ExpRecord>> {
        let size = self.records.len();
        if size == 0 {
            return Err(ReplayError::NotEnoughRecords {
                requested: n,
                stored: 0,
            }
            .into());
        }
        Ok((0..n)
            .map(|_| {
                let ix = self.rng.gen_range(0..size);
                self.records[ix].clone()
            })
            .collect())
    }

    fn evict(&mut self, n: &usize) -> Result<Vec<ExpRecord>> {
        let n = (*n).min(self.records.len());
        Ok(self.records.drain(..n).collect())
    }

    fn start_sample_condition(&self) -> Result<bool> {
        Ok(self.records.len() >= self.start_sample_size.max(1))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
