use super::BoundedBuffer;
use crate::thread::{lock, LoopThread, StopFlag};
use anyhow::Result;
use border_replay_core::{ExpRecord, ReplayError, StoreClient};
use log::{debug, info, warn};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Ingest pipeline: store queue → bounded buffer → `insert`.
///
/// The enqueue thread pops raw records from the store and blocks while the
/// buffer is full. The dequeue thread hands buffered records to the insert
/// handler one at a time.
pub struct ExpQueue {
    store: Arc<dyn StoreClient>,

    /// Name of the queue in the store.
    queue_name: String,

    buffer: Arc<BoundedBuffer<ExpRecord>>,

    /// Delay before polling an empty store queue again or retrying after a failure.
    backoff: Duration,

    enqueue_thread: Mutex<LoopThread>,
    dequeue_thread: Mutex<LoopThread>,
}

impl ExpQueue {
    /// Creates the pipeline. No thread is spawned.
    pub fn new(
        store: Arc<dyn StoreClient>,
        queue_name: impl Into<String>,
        maxsize: usize,
        backoff: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            queue_name: queue_name.into(),
            buffer: Arc::new(BoundedBuffer::new(maxsize, poll_interval)),
            backoff,
            enqueue_thread: Mutex::new(LoopThread::new("replay-exp-enqueue")),
            dequeue_thread: Mutex::new(LoopThread::new("replay-exp-dequeue")),
        }
    }

    /// Number of records pulled from the store and not yet inserted.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if no record is waiting for insertion.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Capacity of the buffer.
    pub fn maxsize(&self) -> usize {
        self.buffer.capacity()
    }

    /// Starts pulling records from the store.
    pub fn start_enqueue_thread(&self) -> Result<()> {
        let store = self.store.clone();
        let queue_name = self.queue_name.clone();
        let buffer = self.buffer.clone();
        let backoff = self.backoff;
        lock(&self.enqueue_thread).start(move |stop| {
            Self::run_enqueue_loop(store, queue_name, buffer, backoff, stop)
        })
    }

    /// Starts passing buffered records to `insert`.
    ///
    /// A record refused by `insert` is handed to `discard` and the loop goes
    /// on with the next one. A record refused because the job queue is shut
    /// down goes back to the tail of the store queue and the loop exits.
    pub fn start_dequeue_thread<F, D>(&self, insert: F, discard: D) -> Result<()>
    where
        F: FnMut(ExpRecord) -> Result<()> + Send + 'static,
        D: FnMut(ExpRecord) + Send + 'static,
    {
        let store = self.store.clone();
        let queue_name = self.queue_name.clone();
        let buffer = self.buffer.clone();
        let backoff = self.backoff;
        lock(&self.dequeue_thread).start(move |stop| {
            Self::run_dequeue_loop(store, queue_name, buffer, insert, discard, backoff, stop)
        })
    }

    /// Stops and joins the enqueue thread.
    pub fn stop_enqueue_thread(&self) -> Result<()> {
        lock(&self.enqueue_thread).stop_and_join()
    }

    /// Stops and joins the dequeue thread.
    ///
    /// A record being inserted is inserted to completion first.
    pub fn stop_dequeue_thread(&self) -> Result<()> {
        lock(&self.dequeue_thread).stop_and_join()
    }

    fn run_enqueue_loop(
        store: Arc<dyn StoreClient>,
        queue_name: String,
        buffer: Arc<BoundedBuffer<ExpRecord>>,
        backoff: Duration,
        stop: StopFlag,
    ) {
        while !stop.is_raised() {
            let record = match store.pop_record(&queue_name) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    stop.sleep(backoff);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to pop a record from {}: {}", queue_name, e);
                    stop.sleep(backoff);
                    continue;
                }
            };

            if let Err(record) = buffer.put(record, &stop) {
                // Stopped while the buffer was full; the record goes back to the store.
                debug!("Returning a record to {} on stop", queue_name);
                if let Err(e) = store.push_record(&queue_name, record) {
                    warn!("Lost a record on stop: {}", e);
                }
                break;
            }
        }
        info!("Exiting enqueue loop of {}", queue_name);
    }

    fn run_dequeue_loop<F, D>(
        store: Arc<dyn StoreClient>,
        queue_name: String,
        buffer: Arc<BoundedBuffer<ExpRecord>>,
        mut insert: F,
        mut discard: D,
        backoff: Duration,
        stop: StopFlag,
    ) where
        F: FnMut(ExpRecord) -> Result<()>,
        D: FnMut(ExpRecord),
    {
        while !stop.is_raised() {
            let record = match buffer.get(&stop) {
                Ok(record) => record,
                Err(_) => break,
            };
            // Kept until the policy has accepted the record.
            let held = record.clone();
            match insert(record) {
                Ok(()) => {}
                Err(e) if ReplayError::is_stop(&e) => {
                    debug!("Insert rejected on shutdown, returning the record to {}", queue_name);
                    if let Err(e) = store.push_record(&queue_name, held) {
                        warn!("Lost a record on stop: {}", e);
                    }
                    break;
                }
                Err(e) => {
                    warn!("Failed to insert a record, discarding it: {}", e);
                    discard(held);
                    stop.sleep(backoff);
                }
            }
        }
        info!("Exiting dequeue loop");
    }
}

impl Drop for ExpQueue {
    fn drop(&mut self) {
        let _ = self.stop_dequeue_thread();
        let _ = self.stop_enqueue_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use border_replay_core::InMemoryStore;
    use std::thread;
    use test_log::test;

    const QUEUE: &str = "replay";

    fn record(reward: f32) -> ExpRecord {
        ExpRecord::new(vec![], reward, vec![])
    }

    fn exp_queue(store: &Arc<InMemoryStore>, maxsize: usize) -> ExpQueue {
        ExpQueue::new(
            store.clone(),
            QUEUE,
            maxsize,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_enqueue_blocks_when_buffer_is_full() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..3 {
            store.push_record(QUEUE, record(i as f32))?;
        }
        let queue = exp_queue(&store, 1);
        queue.start_enqueue_thread()?;
        thread::sleep(Duration::from_millis(100));

        // one record buffered, one held by the blocked enqueue thread
        assert_eq!(queue.len(), 1);
        assert_eq!(store.queue_len(QUEUE)?, 1);

        // the held record goes back to the store on stop
        queue.stop_enqueue_thread()?;
        assert_eq!(queue.len(), 1);
        assert_eq!(store.queue_len(QUEUE)?, 2);
        Ok(())
    }

    #[test]
    fn test_records_flow_to_insert_in_order() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let queue = exp_queue(&store, 2);
        let inserted = Arc::new(Mutex::new(vec![]));

        let sink = inserted.clone();
        queue.start_dequeue_thread(
            move |r| {
                sink.lock().unwrap().push(r.reward);
                Ok(())
            },
            |_| panic!("nothing is refused"),
        )?;
        queue.start_enqueue_thread()?;

        for i in 0..20 {
            store.push_record(QUEUE, record(i as f32))?;
        }
        let expected = (0..20).map(|i| i as f32).collect::<Vec<_>>();
        for _ in 0..200 {
            if inserted.lock().unwrap().len() == expected.len() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        queue.stop_enqueue_thread()?;
        queue.stop_dequeue_thread()?;
        assert_eq!(*inserted.lock().unwrap(), expected);
        Ok(())
    }

    #[test]
    fn test_refused_records_are_discarded() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let queue = exp_queue(&store, 4);
        let n_calls = Arc::new(Mutex::new(0));
        let discarded = Arc::new(Mutex::new(vec![]));

        let n = n_calls.clone();
        let d = discarded.clone();
        queue.start_dequeue_thread(
            move |r| {
                *n.lock().unwrap() += 1;
                if r.reward == 1.0 {
                    Err(ReplayError::NotImplemented("ReplayPolicy::insert").into())
                } else {
                    Ok(())
                }
            },
            move |r| d.lock().unwrap().push(r.reward),
        )?;
        queue.start_enqueue_thread()?;
        for i in 0..3 {
            store.push_record(QUEUE, record(i as f32))?;
        }
        for _ in 0..200 {
            if *n_calls.lock().unwrap() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        queue.stop_enqueue_thread()?;
        queue.stop_dequeue_thread()?;
        assert_eq!(*n_calls.lock().unwrap(), 3);
        assert_eq!(*discarded.lock().unwrap(), vec![1.0]);
        Ok(())
    }

    #[test]
    fn test_record_rejected_on_shutdown_returns_to_store() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let queue = exp_queue(&store, 4);
        queue.start_dequeue_thread(
            |_| Err(ReplayError::ShutDown.into()),
            |_| panic!("a record rejected on shutdown is not discarded"),
        )?;
        queue
            .buffer
            .put(record(7.0), &StopFlag::new(false))
            .map_err(|_| ReplayError::Cancelled)?;

        for _ in 0..200 {
            if store.queue_len(QUEUE)? == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        queue.stop_dequeue_thread()?;
        assert!(queue.is_empty());
        assert_eq!(store.pop_record(QUEUE)?.map(|r| r.reward), Some(7.0));
        Ok(())
    }
}
