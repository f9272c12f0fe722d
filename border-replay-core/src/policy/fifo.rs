//! Replay in which each record is sampled exactly once.
use super::{FifoReplayConfig, ReplayPolicy};
use crate::{ExpRecord, ReplayError};
use anyhow::Result;
use std::collections::VecDeque;

/// Bounded FIFO of records, sampled oldest first.
///
/// Sampling takes records out of the queue. Taken records still hold their
/// observation references, so they are handed back for cleanup by the next
/// `insert` or `evict`, together with any record evicted for capacity.
pub struct FifoReplay {
    capacity: usize,
    start_sample_size: usize,
    records: VecDeque<ExpRecord>,

    /// Sampled records waiting to be reported as evicted.
    consumed: Vec<ExpRecord>,
}

impl FifoReplay {
    /// Builds the policy.
    pub fn build(config: &FifoReplayConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            start_sample_size: config.start_sample_size,
            records: VecDeque::with_capacity(config.capacity.max(1)),
            consumed: vec![],
        }
    }
}

impl ReplayPolicy for FifoReplay {
    type EvictArgs = ();

    fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
        let mut evicted = std::mem::take(&mut self.consumed);
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            evicted.extend(self.records.pop_front());
        }
        Ok(evicted)
    }

    fn sample(&mut self, n: usize) -> Result<Vec<ExpRecord>> {
        if self.records.len() < n {
            return Err(ReplayError::NotEnoughRecords {
                requested: n,
                stored: self.records.len(),
            }
            .into());
        }
        let sampled = self.records.drain(..n).collect::<Vec<_>>();
        self.consumed.extend(sampled.iter().cloned());
        Ok(sampled)
    }

    fn evict(&mut self, _args: &()) -> Result<Vec<ExpRecord>> {
        Ok(std::mem::take(&mut self.consumed))
    }

    fn start_sample_condition(&self) -> Result<bool> {
        Ok(self.records.len() >= self.start_sample_size)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
