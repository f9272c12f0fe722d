//! Store client backed by process memory.
use super::StoreClient;
use crate::{ExpRecord, Observation, Pointer, ReplayError};
use anyhow::Result;
use log::trace;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<ExpRecord>>,
    objects: HashMap<Pointer, Observation>,
    counts: HashMap<Pointer, i64>,
}

/// [`StoreClient`] keeping queues, objects and counters in memory.
///
/// All operations take one lock, which makes every call atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ReplayError::Store("in-memory store lock poisoned".into()).into())
    }

    /// Number of records waiting in queue `queue`.
    pub fn queue_len(&self, queue: &str) -> Result<usize> {
        Ok(self.lock()?.queues.get(queue).map_or(0, |q| q.len()))
    }

    /// Returns `true` if an observation object exists for `ptr`.
    pub fn contains_obs(&self, ptr: &Pointer) -> Result<bool> {
        Ok(self.lock()?.objects.contains_key(ptr))
    }

    /// Number of observation objects in the store.
    pub fn n_objects(&self) -> Result<usize> {
        Ok(self.lock()?.objects.len())
    }
}

impl StoreClient for InMemoryStore {
    fn push_record(&self, queue: &str, record: ExpRecord) -> Result<()> {
        self.lock()?
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(record);
        Ok(())
    }

    fn pop_record(&self, queue: &str) -> Result<Option<ExpRecord>> {
        Ok(self
            .lock()?
            .queues
            .get_mut(queue)
            .and_then(|q| q.pop_front()))
    }

    fn put_obs(&self, ptr: &Pointer, obs: Observation, count: i64) -> Result<()> {
        if count < 0 {
            return Err(ReplayError::ContractViolation(format!(
                "negative initial count {} for {}",
                count, ptr
            ))
            .into());
        }
        let mut state = self.lock()?;
        state.objects.insert(ptr.clone(), obs);
        state.counts.insert(ptr.clone(), count);
        Ok(())
    }

    fn get_obs(&self, ptrs: &[Pointer]) -> Result<Vec<Observation>> {
        let state = self.lock()?;
        ptrs.iter()
            .map(|ptr| {
                state
                    .objects
                    .get(ptr)
                    .cloned()
                    .ok_or_else(|| ReplayError::Store(format!("missing observation {}", ptr)).into())
            })
            .collect()
    }

    fn get_count(&self, ptr: &Pointer) -> Result<i64> {
        Ok(self.lock()?.counts.get(ptr).copied().unwrap_or(0))
    }

    fn incr_counts(&self, ptrs: &[Pointer]) -> Result<()> {
        let mut state = self.lock()?;
        for ptr in ptrs {
            *state.counts.entry(ptr.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn decr_counts(&self, ptrs: &[Pointer]) -> Result<Vec<i64>> {
        let mut state = self.lock()?;
        Ok(ptrs
            .iter()
            .map(|ptr| match state.counts.get_mut(ptr) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    *count
                }
                _ => -1,
            })
            .collect())
    }

    fn mdel(&self, ptrs: &[Pointer]) -> Result<()> {
        let mut state = self.lock()?;
        for ptr in ptrs {
            state.objects.remove(ptr);
            state.counts.remove(ptr);
        }
        trace!("Deleted {} keys", ptrs.len());
        Ok(())
    }
}
