//! State shared by the engine facade and its background threads.
use crate::{FetchedBatch, JobQueue, RefCounter, Reservation, ReplayStats};
use anyhow::Result;
use border_replay_core::{
    obs_pointers_of, ExpRecord, ReplayError, ReplayPolicy, StoreClient,
};
use log::warn;
use std::sync::Arc;

/// Operations composed of a job and the reference counting around it.
pub(crate) struct ReplayCore<P: ReplayPolicy> {
    pub(crate) job_queue: JobQueue<P>,
    pub(crate) ref_counter: RefCounter,
    store: Arc<dyn StoreClient>,
    batch_size: usize,
    stats: Arc<ReplayStats>,
}

impl<P: ReplayPolicy> ReplayCore<P> {
    pub(crate) fn new(
        policy: P,
        store: Arc<dyn StoreClient>,
        batch_size: usize,
        stats: Arc<ReplayStats>,
    ) -> Self {
        Self {
            job_queue: JobQueue::new(policy),
            ref_counter: RefCounter::new(store.clone(), stats.clone()),
            store,
            batch_size,
            stats,
        }
    }

    /// Inserts a record, then cleans up what the insert evicted.
    ///
    /// Once the policy has accepted the record this succeeds; a failed cleanup
    /// stays pending in the reference counter.
    pub(crate) fn insert(&self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
        let evicted = self.job_queue.submit(move |policy| policy.insert(record))?;
        self.stats.add_inserted(evicted.len());
        self.clean_evicted(&evicted);
        Ok(evicted)
    }

    /// Runs an active eviction, then cleans up the evicted records.
    pub(crate) fn evict(&self, args: P::EvictArgs) -> Result<Vec<ExpRecord>> {
        let evicted = self.job_queue.submit(move |policy| policy.evict(&args))?;
        self.stats.add_actively_evicted(evicted.len());
        self.clean_evicted(&evicted);
        Ok(evicted)
    }

    /// Drops the references of a record that never reached the policy.
    pub(crate) fn discard(&self, record: ExpRecord) {
        self.stats.add_discarded();
        self.clean_evicted(&[record]);
    }

    fn clean_evicted(&self, evicted: &[ExpRecord]) {
        if let Err(e) = self.ref_counter.clean_evicted(evicted) {
            warn!(
                "Cleanup of evicted records failed, {} operations pending: {}",
                self.ref_counter.n_pending(),
                e
            );
        }
    }

    /// Samples a batch and reserves its observations within one job.
    ///
    /// Returns `None` while the start condition of the policy does not hold.
    pub(crate) fn sample_before_fetch(&self) -> Result<Option<Vec<ExpRecord>>> {
        let batch_size = self.batch_size;
        let ref_counter = self.ref_counter.clone();
        self.job_queue.submit(move |policy| {
            if !policy.start_sample_condition()? {
                return Ok(None);
            }
            let sampled = policy.sample(batch_size)?;
            if sampled.len() != batch_size {
                return Err(ReplayError::ContractViolation(format!(
                    "sample({}) returned {} records",
                    batch_size,
                    sampled.len()
                ))
                .into());
            }
            // Reserved before the job ends, so no eviction can delete them in between.
            ref_counter.increment(&obs_pointers_of(&sampled))?;
            Ok(Some(sampled))
        })
    }

    /// Fetches the observations of reserved records.
    ///
    /// On failure the reservation is released before returning the error.
    pub(crate) fn fetch(&self, sampled: Vec<ExpRecord>) -> Result<FetchedBatch> {
        let reservation = Reservation::new(obs_pointers_of(&sampled));
        let obs = match self.store.get_obs(reservation.pointers()) {
            Ok(obs) if obs.len() == reservation.pointers().len() => obs,
            Ok(obs) => {
                let err = ReplayError::ContractViolation(format!(
                    "store returned {} observations for {} pointers",
                    obs.len(),
                    reservation.pointers().len()
                ));
                self.release(reservation);
                return Err(err.into());
            }
            Err(e) => {
                self.release(reservation);
                return Err(e);
            }
        };

        let mut obs = obs.into_iter();
        let experiences = sampled
            .into_iter()
            .map(|record| {
                let n = record.obs_pointers.len();
                let o = obs.by_ref().take(n).collect::<Vec<_>>();
                record.materialize(o)
            })
            .collect();
        self.stats.add_sampled_batch();

        Ok(FetchedBatch {
            experiences,
            reservation,
        })
    }

    /// Body of the prefetch loop.
    pub(crate) fn sample_and_fetch(&self) -> Result<Option<FetchedBatch>> {
        match self.sample_before_fetch()? {
            Some(sampled) => self.fetch(sampled).map(Some),
            None => Ok(None),
        }
    }

    /// Releases a reservation. A failed release stays pending in the reference counter.
    pub(crate) fn release(&self, reservation: Reservation) {
        if let Err(e) = self.ref_counter.release(&reservation.into_pointers()) {
            warn!(
                "Release failed, {} operations pending: {}",
                self.ref_counter.n_pending(),
                e
            );
        }
    }
}
