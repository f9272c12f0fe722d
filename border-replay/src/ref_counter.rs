//! Reference counting of observations shared between records and batches.
//!
//! An observation stays in the store while its counter is positive. The
//! counter is the number of holders: records stored by the policy plus
//! sampled batches not yet released. Producers set the initial value; the
//! engine adds one per sampled reference and removes one per evicted or
//! released reference. Only the decrement that brings a counter to zero
//! deletes the observation.
//!
//! A store failure never loses work: decrements and deletes that could not be
//! applied stay pending in the [`RefCounter`] and are applied first by the
//! next cleanup or release.
use crate::{thread::lock, ReplayStats};
use anyhow::Result;
use border_replay_core::{obs_pointers_of, ExpRecord, Pointer, StoreClient};
use log::{trace, warn};
use std::sync::{Arc, Mutex};

/// Store operations not applied yet.
#[derive(Default)]
struct Pending {
    /// One entry per reference to drop.
    decrements: Vec<Pointer>,

    /// Keys to remove from the store.
    deletes: Vec<Pointer>,
}

/// Reference-count operations on top of the store client.
#[derive(Clone)]
pub struct RefCounter {
    store: Arc<dyn StoreClient>,
    stats: Arc<ReplayStats>,
    pending: Arc<Mutex<Pending>>,
}

impl RefCounter {
    /// Creates a reference counter working on `store`.
    pub fn new(store: Arc<dyn StoreClient>, stats: Arc<ReplayStats>) -> Self {
        Self {
            store,
            stats,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Adds one reference per element of `ptrs`.
    pub fn increment(&self, ptrs: &[Pointer]) -> Result<()> {
        if ptrs.is_empty() {
            return Ok(());
        }
        self.store.incr_counts(ptrs)
    }

    /// Removes one reference per element of `ptrs`.
    ///
    /// With `delete_on_zero`, returns the pointers whose counter reached zero
    /// by this call; the caller deletes them. A counter that was already zero
    /// is left alone and reported as a warning.
    pub fn decrement(&self, ptrs: &[Pointer], delete_on_zero: bool) -> Result<Vec<Pointer>> {
        if ptrs.is_empty() {
            return Ok(vec![]);
        }
        let counts = self.store.decr_counts(ptrs)?;
        let mut deleted = vec![];
        for (ptr, count) in ptrs.iter().zip(counts) {
            if count < 0 {
                warn!("Reference count of {} is already zero", ptr);
            } else if count == 0 && delete_on_zero {
                deleted.push(ptr.clone());
            }
        }
        Ok(deleted)
    }

    /// Drops the references held by evicted records and deletes what is no longer referenced.
    ///
    /// Record slots (`exp_pointer`) are always deleted; observations only when
    /// their counter reaches zero. On error the work stays pending.
    pub fn clean_evicted(&self, evicted: &[ExpRecord]) -> Result<()> {
        let exp_ptrs = evicted
            .iter()
            .filter_map(|r| r.exp_pointer.clone())
            .collect::<Vec<_>>();
        self.settle(obs_pointers_of(evicted), exp_ptrs)
    }

    /// Drops references held by a sampled batch. On error the work stays pending.
    pub fn release(&self, ptrs: &[Pointer]) -> Result<()> {
        self.stats.add_released(ptrs.len());
        self.settle(ptrs.to_vec(), vec![])
    }

    /// Applies pending decrements and deletes.
    pub fn flush(&self) -> Result<()> {
        self.settle(vec![], vec![])
    }

    /// Number of references and keys waiting for the store.
    pub fn n_pending(&self) -> usize {
        let pending = lock(&self.pending);
        pending.decrements.len() + pending.deletes.len()
    }

    fn settle(&self, decrements: Vec<Pointer>, deletes: Vec<Pointer>) -> Result<()> {
        let mut pending = lock(&self.pending);
        pending.decrements.extend(decrements);
        pending.deletes.extend(deletes);

        if !pending.decrements.is_empty() {
            let zeros = self.decrement(&pending.decrements, true)?;
            pending.decrements.clear();
            pending.deletes.extend(zeros);
        }
        if !pending.deletes.is_empty() {
            trace!("Deleting {:?}", pending.deletes);
            self.store.mdel(&pending.deletes)?;
            self.stats.add_deleted(pending.deletes.len());
            pending.deletes.clear();
        }
        Ok(())
    }
}
