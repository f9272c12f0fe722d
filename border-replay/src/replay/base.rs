use super::{ReplayCore, SampleIter};
use crate::{
    evict_thread::EvictThread, thread::lock, ExpQueue, FetchedBatch, ObsFetchQueue,
    ReplayStats, ReplayStatsSnapshot, Reservation,
};
use anyhow::Result;
use border_replay_core::{
    BatchAggregator, ExpRecord, ReplayConfig, ReplayError, ReplayPolicy, StoreClient,
};
use log::{info, warn};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Distributed experience replay.
///
/// Producers push [`ExpRecord`]s to the store queue named in the config; a
/// training loop calls [`Replay::sample`]. In between, the engine runs:
///
/// * a job queue owning the policy, so that insert, sample and evict never
///   overlap,
/// * the ingest pipeline ([`ExpQueue`]) inserting records from the store,
/// * the prefetch pipeline ([`ObsFetchQueue`]) keeping batches ready,
/// * optionally, a thread evicting records periodically.
///
/// Construction spawns nothing; call [`Replay::start_queue_threads`].
///
/// # Reference counting
///
/// A sampled batch holds one reference per observation pointer of its
/// records. [`Replay::sample`] releases it once the aggregator is done. A
/// caller using [`Replay::fetch_batch`] instead must pass the
/// [`Reservation`] of the batch to [`Replay::release`].
///
/// # Fairness
///
/// Jobs from the ingest pipeline, the prefetch pipeline, the eviction
/// thread and direct calls run in order of arrival at the job queue.
pub struct Replay<P: ReplayPolicy, G: BatchAggregator> {
    config: ReplayConfig,
    core: Arc<ReplayCore<P>>,
    exp_queue: ExpQueue,
    obs_fetch_queue: ObsFetchQueue,
    evict_thread: Mutex<Option<EvictThread>>,
    aggregator: G,
    stats: Arc<ReplayStats>,
}

impl<P: ReplayPolicy, G: BatchAggregator> Replay<P, G> {
    /// Builds the engine around `policy`.
    pub fn new(
        config: ReplayConfig,
        policy: P,
        store: Arc<dyn StoreClient>,
        aggregator: G,
    ) -> Result<Self> {
        config.validate()?;
        let stats = Arc::new(ReplayStats::default());
        let core = Arc::new(ReplayCore::new(
            policy,
            store.clone(),
            config.batch_size,
            stats.clone(),
        ));
        let exp_queue = ExpQueue::new(
            store,
            config.name.clone(),
            config.exp_queue_size,
            config.backoff(),
            config.poll_interval(),
        );
        let obs_fetch_queue = ObsFetchQueue::new(
            config.fetch_queue_size,
            config.backoff(),
            config.poll_interval(),
        );

        Ok(Self {
            config,
            core,
            exp_queue,
            obs_fetch_queue,
            evict_thread: Mutex::new(None),
            aggregator,
            stats,
        })
    }

    /// Number of records in a sampled batch.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Configuration of the engine.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Current values of the counters.
    pub fn stats(&self) -> ReplayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Formatted counters for reporting.
    pub fn stats_fmt(&self) -> String {
        self.stats.fmt()
    }

    /// Number of records stored by the policy.
    pub fn len(&self) -> Result<usize> {
        self.core.job_queue.submit(|policy| Ok(policy.len()))
    }

    /// Returns `true` if the policy stores no record.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns `true` while the job queue accepts jobs.
    pub fn is_running(&self) -> bool {
        self.core.job_queue.is_running()
    }

    /// Inserts a record and returns the records evicted by it.
    ///
    /// References held by evicted records are dropped before returning.
    pub fn insert(&self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
        self.core.insert(record)
    }

    /// Runs an active eviction and returns the evicted records.
    pub fn evict(&self, args: P::EvictArgs) -> Result<Vec<ExpRecord>> {
        self.core.evict(args)
    }

    /// Takes a prefetched batch without aggregating it, blocking while none is ready.
    ///
    /// The caller owns the reservation and must hand it to [`Replay::release`].
    /// Fails with [`ReplayError::Cancelled`] once the queue threads are stopped
    /// and no batch is left.
    pub fn fetch_batch(&self) -> Result<FetchedBatch> {
        self.obs_fetch_queue.dequeue()
    }

    /// Drops the references held by a sampled batch.
    ///
    /// A store failure is logged and the release is retried by the next
    /// cleanup, so the reservation is never lost.
    pub fn release(&self, reservation: Reservation) {
        self.core.release(reservation)
    }

    /// Takes a prefetched batch, aggregates it and releases its references.
    ///
    /// Blocks while no batch is ready.
    pub fn sample(&self) -> Result<G::Batch> {
        let FetchedBatch {
            experiences,
            reservation,
        } = self.fetch_batch()?;
        let batch = self.aggregator.aggregate(experiences);
        self.release(reservation);
        batch
    }

    /// Lazy sequence of [`Replay::sample`] results.
    ///
    /// The sequence ends as soon as `stop_condition` returns `false`.
    ///
    /// ```rust,ignore
    /// let mut n = 0;
    /// for batch in replay.sample_iterator(|| { n += 1; n <= 1000 }) {
    ///     agent.opt(&batch?);
    /// }
    /// ```
    pub fn sample_iterator<F>(&self, stop_condition: F) -> SampleIter<'_, P, G, F>
    where
        F: FnMut() -> bool,
    {
        SampleIter::new(self, stop_condition)
    }

    /// [`Replay::sample_iterator`] that never stops by itself.
    pub fn sample_iter(&self) -> SampleIter<'_, P, G, fn() -> bool> {
        fn never_stop() -> bool {
            true
        }
        SampleIter::new(self, never_stop as fn() -> bool)
    }

    /// Launches the job worker and the threads of both pipelines.
    pub fn start_queue_threads(&self) -> Result<()> {
        self.core.job_queue.start()?;

        let core = self.core.clone();
        let core_ = self.core.clone();
        self.exp_queue.start_dequeue_thread(
            move |record| core.insert(record).map(|_| ()),
            move |record| core_.discard(record),
        )?;
        self.exp_queue.start_enqueue_thread()?;

        let core = self.core.clone();
        let core_ = self.core.clone();
        self.obs_fetch_queue.start_enqueue_thread(
            move || core.sample_and_fetch(),
            move |reservation| {
                core_.release(reservation);
                Ok(())
            },
        )?;
        info!("Started queue threads of {}", self.config.name);
        Ok(())
    }

    /// Stops the threads launched by [`Replay::start_queue_threads`].
    ///
    /// Jobs in flight complete. Prefetched batches are discarded and their
    /// references released. Records pulled from the store but not inserted
    /// stay buffered until the threads are started again.
    pub fn stop_queue_threads(&self) -> Result<()> {
        // Loops submitting jobs stop while the worker still runs, so none of
        // them is left with a rejected job.
        let results = vec![
            self.obs_fetch_queue.stop_enqueue_thread(),
            self.exp_queue.stop_dequeue_thread(),
            self.core.job_queue.stop(),
            self.exp_queue.stop_enqueue_thread(),
        ];

        let mut n_released = 0;
        for batch in self.obs_fetch_queue.drain() {
            n_released += 1;
            self.core.release(batch.reservation);
        }
        if let Err(e) = self.core.ref_counter.flush() {
            warn!(
                "{} reference operations still pending: {}",
                self.core.ref_counter.n_pending(),
                e
            );
        }
        info!(
            "Stopped queue threads of {}, released {} prefetched batches",
            self.config.name, n_released
        );
        results.into_iter().collect()
    }

    /// Launches a thread calling [`Replay::evict`] with `args` periodically.
    ///
    /// `sleep_interval` defaults to `evict_interval` of the config.
    pub fn start_evict_thread(
        &self,
        args: P::EvictArgs,
        sleep_interval: Option<Duration>,
    ) -> Result<()> {
        let mut evict_thread = lock(&self.evict_thread);
        if evict_thread.is_some() {
            return Err(ReplayError::AlreadyRunning("evict thread".into()).into());
        }
        let sleep_interval = sleep_interval
            .unwrap_or_else(|| Duration::from_secs_f32(self.config.evict_interval));
        *evict_thread = Some(EvictThread::start(self.core.clone(), args, sleep_interval)?);
        info!("Started evict thread, interval {:?}", sleep_interval);
        Ok(())
    }

    /// Stops the thread launched by [`Replay::start_evict_thread`].
    ///
    /// Fails with [`ReplayError::InvalidState`] if no such thread is running.
    pub fn stop_evict_thread(&self) -> Result<()> {
        let evict_thread = lock(&self.evict_thread)
            .take()
            .ok_or_else(|| ReplayError::InvalidState("evict thread is not running".into()))?;
        let interval = evict_thread.sleep_interval();
        evict_thread.stop()?;
        info!("Stopped evict thread, interval {:?}", interval);
        Ok(())
    }
}

impl<P: ReplayPolicy, G: BatchAggregator> Drop for Replay<P, G> {
    fn drop(&mut self) {
        if let Some(evict_thread) = lock(&self.evict_thread).take() {
            let _ = evict_thread.stop();
        }
        if let Err(e) = self.stop_queue_threads() {
            warn!("Failed to stop queue threads: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ref_counter::tests::FlakyStore;
    use border_replay_core::{
        policy::{FifoReplay, FifoReplayConfig, UniformReplay, UniformReplayConfig},
        ActionSpec, ExpBatch, InMemoryStore, ObsSpec, Pointer, StackAggregator,
    };
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        thread,
        time::Instant,
    };
    use test_log::test;

    const QUEUE: &str = "replay";

    fn aggregator() -> StackAggregator {
        StackAggregator::new(ObsSpec::new([4]), ActionSpec::discrete(2))
    }

    fn config(batch_size: usize) -> ReplayConfig {
        ReplayConfig::new(batch_size)
            .name(QUEUE)
            .fetch_queue_size(1)
            .backoff_ms(1)
            .poll_interval_ms(5)
    }

    fn obs_ptr(i: usize) -> Pointer {
        Pointer::new(format!("obs-{}", i))
    }

    /// Writes the observation of record `i` like a producer would and returns the record.
    fn produce(store: &InMemoryStore, i: usize) -> ExpRecord {
        store
            .put_obs(&obs_ptr(i), vec![i as f32; 4], 1)
            .unwrap();
        ExpRecord::new(vec![obs_ptr(i)], i as f32, vec![(i % 2) as f32])
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn kind(err: &anyhow::Error) -> Option<&ReplayError> {
        err.downcast_ref::<ReplayError>()
    }

    fn uniform(capacity: usize, start_sample_size: usize) -> UniformReplay {
        UniformReplay::build(
            &UniformReplayConfig::default()
                .capacity(capacity)
                .start_sample_size(start_sample_size),
        )
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let store = Arc::new(InMemoryStore::new());
        let err = Replay::new(ReplayConfig::new(0), uniform(10, 1), store, aggregator())
            .err()
            .unwrap();
        assert!(matches!(kind(&err), Some(ReplayError::InvalidConfig(_))));
    }

    #[test]
    fn test_sample_before_start_is_cancelled() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(2), uniform(10, 1), store, aggregator())?;
        assert!(!replay.is_running());
        let err = replay.sample().unwrap_err();
        assert_eq!(kind(&err), Some(&ReplayError::Cancelled));
        let err = replay.len().unwrap_err();
        assert_eq!(kind(&err), Some(&ReplayError::ShutDown));
        Ok(())
    }

    #[test]
    fn test_sample_returns_batch_from_stored_records() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(2), uniform(10, 1), store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        for i in 0..3 {
            assert!(replay.insert(produce(&store, i))?.is_empty());
        }

        let batch: ExpBatch = replay.sample()?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.obs.len(), 1);
        assert_eq!(batch.obs[0].len(), 8);
        for (k, reward) in batch.reward.iter().enumerate() {
            assert!([0.0, 1.0, 2.0].contains(reward));
            assert_eq!(batch.obs[0][4 * k], *reward);
        }

        replay.stop_queue_threads()?;

        // Every reservation, prefetched or sampled, has been released.
        for i in 0..3 {
            assert_eq!(store.get_count(&obs_ptr(i))?, 1);
        }
        let stats = replay.stats();
        assert!(stats.sampled_batches >= 1);
        assert_eq!(stats.released_pointers, 2 * stats.sampled_batches);
        assert_eq!(stats.deleted_keys, 0);
        Ok(())
    }

    #[test]
    fn test_fetch_batch_holds_references_until_release() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(1), uniform(1, 1), store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        replay.insert(produce(&store, 0))?;

        let fetched = replay.fetch_batch()?;
        assert_eq!(fetched.reservation.pointers(), &[obs_ptr(0)]);

        // Evicting the record leaves the observation to the reservation.
        replay.insert(produce(&store, 1))?;
        assert_eq!(replay.stats().passively_evicted, 1);
        assert!(store.contains_obs(&obs_ptr(0))?);
        assert_eq!(fetched.experiences[0].obs, vec![vec![0.0; 4]]);

        replay.release(fetched.reservation);
        replay.stop_queue_threads()?;
        assert!(!store.contains_obs(&obs_ptr(0))?);
        assert_eq!(store.get_count(&obs_ptr(1))?, 1);
        Ok(())
    }

    #[test]
    fn test_ingest_from_store_queue() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..5 {
            let record = produce(&store, i);
            store.push_record(QUEUE, record)?;
        }
        let replay = Replay::new(
            config(2).exp_queue_size(2),
            uniform(10, 100),
            store.clone(),
            aggregator(),
        )?;
        replay.start_queue_threads()?;
        wait_until(|| replay.len().unwrap() == 5);
        assert_eq!(store.queue_len(QUEUE)?, 0);
        assert_eq!(replay.stats().inserted, 5);
        replay.stop_queue_threads()?;
        Ok(())
    }

    #[test]
    fn test_capacity_is_never_exceeded() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(2), uniform(3, 100), store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        for i in 0..5 {
            replay.insert(produce(&store, i))?;
            assert!(replay.len()? <= 3);
        }
        assert_eq!(replay.len()?, 3);
        assert!(!store.contains_obs(&obs_ptr(0))?);
        assert!(!store.contains_obs(&obs_ptr(1))?);
        assert!(store.contains_obs(&obs_ptr(4))?);
        assert_eq!(replay.stats().passively_evicted, 2);
        replay.stop_queue_threads()?;
        Ok(())
    }

    #[test]
    fn test_fifo_samples_each_record_once() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let policy = FifoReplay::build(
            &FifoReplayConfig::default()
                .capacity(100)
                .start_sample_size(2),
        );
        let replay = Replay::new(config(2), policy, store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        for i in 0..6 {
            replay.insert(produce(&store, i))?;
        }

        let mut rewards = vec![];
        for batch in replay.sample_iter().take(3) {
            rewards.extend(batch?.reward);
        }
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        // Consumed records not yet reported by an insert go with this eviction.
        replay.evict(())?;
        replay.stop_queue_threads()?;
        assert_eq!(store.n_objects()?, 0);
        Ok(())
    }

    #[test]
    fn test_sample_iterator_stops() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(2), uniform(10, 1), store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        for i in 0..4 {
            replay.insert(produce(&store, i))?;
        }

        let mut n = 0;
        let batches = replay
            .sample_iterator(|| {
                n += 1;
                n <= 3
            })
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(batches.len(), 3);

        replay.stop_queue_threads()?;
        let mut iter = replay.sample_iter();
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        Ok(())
    }

    #[test]
    fn test_evict_thread() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(2), uniform(10, 100), store.clone(), aggregator())?;

        let err = replay.stop_evict_thread().unwrap_err();
        assert!(matches!(kind(&err), Some(ReplayError::InvalidState(_))));

        replay.start_queue_threads()?;
        for i in 0..3 {
            replay.insert(produce(&store, i))?;
        }
        replay.start_evict_thread(1, Some(Duration::from_millis(10)))?;
        let err = replay
            .start_evict_thread(1, Some(Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(kind(&err), Some(ReplayError::AlreadyRunning(_))));

        wait_until(|| replay.len().unwrap() == 0);
        replay.stop_evict_thread()?;
        assert!(replay.stop_evict_thread().is_err());

        assert_eq!(replay.stats().actively_evicted, 3);
        assert_eq!(store.n_objects()?, 0);

        // A stopped scheduler can be replaced.
        replay.start_evict_thread(1, None)?;
        replay.stop_evict_thread()?;
        replay.stop_queue_threads()?;
        Ok(())
    }

    #[test]
    fn test_restart_queue_threads() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(1), uniform(10, 1), store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        let err = replay.start_queue_threads().unwrap_err();
        assert!(matches!(kind(&err), Some(ReplayError::AlreadyRunning(_))));
        replay.insert(produce(&store, 0))?;
        replay.stop_queue_threads()?;

        replay.start_queue_threads()?;
        assert_eq!(replay.len()?, 1);
        assert_eq!(replay.sample()?.len(), 1);
        replay.stop_queue_threads()?;
        assert_eq!(store.get_count(&obs_ptr(0))?, 1);
        Ok(())
    }

    /// Policy implementing nothing beyond `insert`.
    struct InsertOnly(Vec<ExpRecord>);

    impl ReplayPolicy for InsertOnly {
        type EvictArgs = ();

        fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
            self.0.push(record);
            Ok(vec![])
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_missing_capability_does_not_kill_worker() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(1), InsertOnly(vec![]), store.clone(), aggregator())?;
        replay.start_queue_threads()?;
        replay.insert(produce(&store, 0))?;

        let err = replay.core.sample_before_fetch().unwrap_err();
        assert!(matches!(kind(&err), Some(ReplayError::NotImplemented(_))));
        assert!(replay.evict(())?.is_empty());

        // The prefetch loop keeps failing without affecting other jobs.
        thread::sleep(Duration::from_millis(20));
        replay.insert(produce(&store, 1))?;
        assert_eq!(replay.len()?, 2);
        replay.stop_queue_threads()?;
        Ok(())
    }

    /// Policy counting overlapping calls.
    struct Instrumented {
        records: Vec<ExpRecord>,
        active: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
    }

    impl Instrumented {
        fn enter(&self) {
            if self.active.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(200));
        }

        fn exit(&self) {
            self.active.store(false, Ordering::SeqCst);
        }
    }

    impl ReplayPolicy for Instrumented {
        type EvictArgs = ();

        fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
            self.enter();
            self.records.push(record);
            self.exit();
            Ok(vec![])
        }

        fn sample(&mut self, n: usize) -> Result<Vec<ExpRecord>> {
            self.enter();
            let sampled = self.records.iter().rev().take(n).cloned().collect();
            self.exit();
            Ok(sampled)
        }

        fn evict(&mut self, _args: &()) -> Result<Vec<ExpRecord>> {
            self.enter();
            self.exit();
            Ok(vec![])
        }

        fn start_sample_condition(&self) -> Result<bool> {
            self.enter();
            self.exit();
            Ok(self.records.len() >= 2)
        }

        fn len(&self) -> usize {
            self.records.len()
        }
    }

    #[test]
    fn test_policy_calls_never_overlap() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let overlaps = Arc::new(AtomicUsize::new(0));
        let policy = Instrumented {
            records: vec![],
            active: Arc::new(AtomicBool::new(false)),
            overlaps: overlaps.clone(),
        };
        let replay = Replay::new(config(2), policy, store.clone(), aggregator())?;
        let records = (0..40).map(|i| produce(&store, i)).collect::<Vec<_>>();
        replay.start_queue_threads()?;
        replay.start_evict_thread((), Some(Duration::from_millis(1)))?;

        thread::scope(|s| {
            for chunk in records.chunks(20) {
                let replay = &replay;
                s.spawn(move || {
                    for record in chunk {
                        replay.insert(record.clone()).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..20 {
                    replay.evict(()).unwrap();
                }
            });
            for _ in 0..5 {
                assert_eq!(replay.sample().unwrap().len(), 2);
            }
        });

        replay.stop_evict_thread()?;
        assert_eq!(replay.len()?, 40);
        replay.stop_queue_threads()?;
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        for i in 0..40 {
            assert_eq!(store.get_count(&obs_ptr(i))?, 1);
        }
        Ok(())
    }

    #[test]
    fn test_failed_cleanup_is_retried() -> Result<()> {
        let store = Arc::new(FlakyStore::default());
        for i in 0..2 {
            let record = produce(&store.inner, i);
            store.push_record(QUEUE, record)?;
        }
        store.decr_failures.store(1, Ordering::SeqCst);
        let replay = Replay::new(config(1), uniform(1, 100), store.clone(), aggregator())?;
        replay.start_queue_threads()?;

        // obs-0 is evicted by the ingest of obs-1 while the store is failing
        wait_until(|| replay.core.ref_counter.n_pending() == 1);
        assert_eq!(replay.stats().inserted, 2);
        assert_eq!(store.get_count(&obs_ptr(0))?, 1);

        // the next cleanup applies the pending decrement first
        let evicted = replay.insert(produce(&store.inner, 2))?;
        assert_eq!(evicted.len(), 1);
        assert!(!store.inner.contains_obs(&obs_ptr(0))?);
        assert!(!store.inner.contains_obs(&obs_ptr(1))?);

        // a committed insert succeeds even if its cleanup fails
        store.decr_failures.store(1, Ordering::SeqCst);
        let evicted = replay.insert(produce(&store.inner, 3))?;
        assert_eq!(evicted[0].reward, 2.0);
        assert!(store.inner.contains_obs(&obs_ptr(2))?);

        replay.stop_queue_threads()?;
        assert_eq!(replay.core.ref_counter.n_pending(), 0);
        assert!(!store.inner.contains_obs(&obs_ptr(2))?);
        assert!(store.inner.contains_obs(&obs_ptr(3))?);
        Ok(())
    }

    /// Policy refusing records with an odd reward.
    struct EvenOnly(Vec<ExpRecord>);

    impl ReplayPolicy for EvenOnly {
        type EvictArgs = ();

        fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
            if record.reward as usize % 2 == 1 {
                return Err(ReplayError::InvalidState("odd reward".into()).into());
            }
            self.0.push(record);
            Ok(vec![])
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_refused_record_releases_its_observations() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..3 {
            let record = produce(&store, i);
            store.push_record(QUEUE, record)?;
        }
        let replay = Replay::new(config(1), EvenOnly(vec![]), store.clone(), aggregator())?;
        replay.start_queue_threads()?;

        wait_until(|| {
            let stats = replay.stats();
            stats.inserted == 2 && stats.discarded == 1
        });
        assert_eq!(replay.len()?, 2);
        assert!(store.contains_obs(&obs_ptr(0))?);
        assert!(!store.contains_obs(&obs_ptr(1))?);
        assert!(store.contains_obs(&obs_ptr(2))?);
        replay.stop_queue_threads()?;
        Ok(())
    }

    #[test]
    fn test_early_start_condition_waits_for_records() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let policy = FifoReplay::build(&FifoReplayConfig::default().start_sample_size(1));
        let replay = Replay::new(config(2), policy, store.clone(), aggregator())?;
        replay.start_queue_threads()?;

        // the policy may be asked for two records while it holds one
        replay.insert(produce(&store, 0))?;
        thread::sleep(Duration::from_millis(30));
        assert_eq!(replay.len()?, 1);
        replay.insert(produce(&store, 1))?;

        let mut rewards = replay.sample()?.reward;
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, vec![0.0, 1.0]);
        replay.stop_queue_threads()?;
        Ok(())
    }

    #[test]
    fn test_stop_wakes_blocked_sample() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let replay = Replay::new(config(2), uniform(10, 1), store, aggregator())?;
        replay.start_queue_threads()?;

        thread::scope(|s| {
            let consumer = s.spawn(|| replay.sample());
            thread::sleep(Duration::from_millis(50));
            assert!(!consumer.is_finished());

            replay.stop_queue_threads().unwrap();
            let err = consumer.join().unwrap().unwrap_err();
            assert_eq!(kind(&err), Some(&ReplayError::Cancelled));
        });
        Ok(())
    }
}
