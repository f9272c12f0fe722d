use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters of the replay engine, updated by all of its threads.
#[derive(Debug, Default)]
pub struct ReplayStats {
    inserted: AtomicUsize,
    passively_evicted: AtomicUsize,
    actively_evicted: AtomicUsize,
    sampled_batches: AtomicUsize,
    released_pointers: AtomicUsize,
    deleted_keys: AtomicUsize,
    discarded: AtomicUsize,
}

/// Values of [`ReplayStats`] at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayStatsSnapshot {
    /// Records inserted into the policy.
    pub inserted: usize,

    /// Records evicted by inserts.
    pub passively_evicted: usize,

    /// Records evicted by `evict`.
    pub actively_evicted: usize,

    /// Batches sampled and reserved.
    pub sampled_batches: usize,

    /// Observation references released after sampling.
    pub released_pointers: usize,

    /// Keys removed from the store.
    pub deleted_keys: usize,

    /// Records the policy refused, whose references were dropped.
    pub discarded: usize,
}

impl ReplayStats {
    pub(crate) fn add_inserted(&self, n_evicted: usize) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
        self.passively_evicted.fetch_add(n_evicted, Ordering::Relaxed);
    }

    pub(crate) fn add_actively_evicted(&self, n: usize) {
        self.actively_evicted.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_sampled_batch(&self) {
        self.sampled_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_released(&self, n: usize) {
        self.released_pointers.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_deleted(&self, n: usize) {
        self.deleted_keys.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    pub fn snapshot(&self) -> ReplayStatsSnapshot {
        ReplayStatsSnapshot {
            inserted: self.inserted.load(Ordering::Relaxed),
            passively_evicted: self.passively_evicted.load(Ordering::Relaxed),
            actively_evicted: self.actively_evicted.load(Ordering::Relaxed),
            sampled_batches: self.sampled_batches.load(Ordering::Relaxed),
            released_pointers: self.released_pointers.load(Ordering::Relaxed),
            deleted_keys: self.deleted_keys.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    /// Returns a formatted string for reporting.
    pub fn fmt(&self) -> String {
        let s = self.snapshot();
        let mut out =
            "inserted, passively evicted, actively evicted, sampled batches, released, deleted, discarded\n"
                .to_string();
        out += format!(
            "{}, {}, {}, {}, {}, {}, {}\n",
            s.inserted,
            s.passively_evicted,
            s.actively_evicted,
            s.sampled_batches,
            s.released_pointers,
            s.deleted_keys,
            s.discarded
        )
        .as_str();
        out
    }
}
