use super::BoundedBuffer;
use crate::thread::{lock, LoopThread, StopFlag};
use anyhow::Result;
use border_replay_core::{Experience, Pointer, ReplayError};
use log::{debug, info, warn};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Observation references held on behalf of a sampled batch.
///
/// Must be handed back to [`Replay::release`](crate::Replay::release) once
/// the batch has been consumed, or the observations are never deleted.
#[must_use = "a reservation keeps observations alive until it is released"]
#[derive(Debug, PartialEq)]
pub struct Reservation {
    pointers: Vec<Pointer>,
}

impl Reservation {
    pub(crate) fn new(pointers: Vec<Pointer>) -> Self {
        Self { pointers }
    }

    /// Reserved pointers, one element per reference.
    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    pub(crate) fn into_pointers(self) -> Vec<Pointer> {
        self.pointers
    }
}

/// A sampled batch with its observations fetched from the store.
#[derive(Debug)]
pub struct FetchedBatch {
    /// Materialized experiences, `batch_size` of them.
    pub experiences: Vec<Experience>,

    /// References to release after use.
    pub reservation: Reservation,
}

/// Prefetch pipeline: sample-then-reserve jobs → bounded buffer → consumer.
///
/// The enqueue thread keeps up to `maxsize` batches ready so that the
/// consumer rarely waits for a round-trip to the job queue and the store.
pub struct ObsFetchQueue {
    buffer: Arc<BoundedBuffer<FetchedBatch>>,

    /// Delay before asking for a batch again when none was produced.
    backoff: Duration,

    enqueue_thread: Mutex<LoopThread>,
}

impl ObsFetchQueue {
    /// Creates the pipeline. No thread is spawned.
    pub fn new(maxsize: usize, backoff: Duration, poll_interval: Duration) -> Self {
        Self {
            buffer: Arc::new(BoundedBuffer::new(maxsize, poll_interval)),
            backoff,
            enqueue_thread: Mutex::new(LoopThread::new("replay-obs-fetch")),
        }
    }

    /// Number of batches ready to be consumed.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if no batch is ready.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Capacity of the buffer.
    pub fn maxsize(&self) -> usize {
        self.buffer.capacity()
    }

    /// Starts prefetching.
    ///
    /// `fetch` returns `Ok(None)` while sampling is not allowed yet. `release`
    /// is called for a batch that cannot be buffered because of a stop request.
    pub fn start_enqueue_thread<F, R>(&self, fetch: F, release: R) -> Result<()>
    where
        F: FnMut() -> Result<Option<FetchedBatch>> + Send + 'static,
        R: Fn(Reservation) -> Result<()> + Send + 'static,
    {
        let buffer = self.buffer.clone();
        let backoff = self.backoff;
        lock(&self.enqueue_thread)
            .start(move |stop| Self::run_enqueue_loop(buffer, fetch, release, backoff, stop))
    }

    /// Stops and joins the enqueue thread. Buffered batches are kept.
    pub fn stop_enqueue_thread(&self) -> Result<()> {
        lock(&self.enqueue_thread).stop_and_join()
    }

    /// Takes the oldest batch, blocking while none is ready.
    ///
    /// Fails with [`ReplayError::Cancelled`] when the buffer is empty and the
    /// enqueue thread is not running.
    pub fn dequeue(&self) -> Result<FetchedBatch> {
        let stop = lock(&self.enqueue_thread).stop_flag();
        self.buffer.get(&stop)
    }

    /// Takes all buffered batches.
    pub fn drain(&self) -> Vec<FetchedBatch> {
        self.buffer.drain()
    }

    fn run_enqueue_loop<F, R>(
        buffer: Arc<BoundedBuffer<FetchedBatch>>,
        mut fetch: F,
        release: R,
        backoff: Duration,
        stop: StopFlag,
    ) where
        F: FnMut() -> Result<Option<FetchedBatch>>,
        R: Fn(Reservation) -> Result<()>,
    {
        while !stop.is_raised() {
            let batch = match fetch() {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    stop.sleep(backoff);
                    continue;
                }
                Err(e) => {
                    if ReplayError::is_stop(&e) {
                        debug!("Sampling rejected on shutdown: {}", e);
                    } else if let Some(ReplayError::NotEnoughRecords { .. }) =
                        e.downcast_ref::<ReplayError>()
                    {
                        // the start condition of the policy allowed a sample too early
                        debug!("Waiting for more records: {}", e);
                    } else {
                        warn!("Failed to prefetch a batch: {}", e);
                    }
                    stop.sleep(backoff);
                    continue;
                }
            };

            if let Err(batch) = buffer.put(batch, &stop) {
                debug!("Releasing a prefetched batch on stop");
                if let Err(e) = release(batch.reservation) {
                    warn!("Failed to release a prefetched batch: {}", e);
                }
                break;
            }
        }
        info!("Exiting prefetch loop");
    }
}

impl Drop for ObsFetchQueue {
    fn drop(&mut self) {
        let _ = self.stop_enqueue_thread();
    }
}
