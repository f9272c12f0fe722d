//! Serialized execution of mutating operations on the replay policy.
//!
//! [`JobQueue`] owns the policy. While running, the policy lives on a single
//! worker thread and is reachable only through jobs, which run one at a time
//! in the order they were submitted. Any number of threads may submit; each
//! blocks until its own job has finished.
use crate::thread::lock;
use anyhow::Result;
use border_replay_core::ReplayError;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

/// A job. It is called with `None` when rejected at shutdown.
type Job<P> = Box<dyn FnOnce(Option<&mut P>) + Send>;

struct Inner<P> {
    /// Sender of jobs, `Some` while the worker accepts submissions.
    sender: Option<Sender<Job<P>>>,

    /// Worker thread; it gives the policy back when it returns.
    handle: Option<JoinHandle<P>>,

    /// The policy while no worker is running.
    policy: Option<P>,
}

/// Single-worker queue of jobs against a policy of type `P`.
///
/// ```rust
/// use border_replay::JobQueue;
///
/// let queue = JobQueue::new(0usize);
/// queue.start().unwrap();
/// let n = queue.submit(|n| { *n += 1; Ok(*n) }).unwrap();
/// assert_eq!(n, 1);
/// assert_eq!(queue.into_policy().unwrap(), 1);
/// ```
pub struct JobQueue<P: Send + 'static> {
    inner: Mutex<Inner<P>>,

    /// Raised by [`JobQueue::stop`]; jobs dequeued afterwards are rejected.
    stopping: Arc<AtomicBool>,

    /// Number of executed jobs.
    n_processed: Arc<AtomicUsize>,
}

impl<P: Send + 'static> JobQueue<P> {
    /// Creates a queue owning `policy`. No thread is spawned.
    pub fn new(policy: P) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sender: None,
                handle: None,
                policy: Some(policy),
            }),
            stopping: Arc::new(AtomicBool::new(false)),
            n_processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawns the worker, moving the policy onto it.
    pub fn start(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.handle.is_some() {
            return Err(ReplayError::AlreadyRunning("job queue".into()).into());
        }
        let policy = inner.policy.take().ok_or_else(|| {
            ReplayError::InvalidState("policy was lost by a crashed job worker".into())
        })?;

        let (sender, receiver) = unbounded();
        self.stopping.store(false, Ordering::SeqCst);
        let stopping = self.stopping.clone();
        let n_processed = self.n_processed.clone();
        let handle = std::thread::Builder::new()
            .name("replay-job-worker".into())
            .spawn(move || Self::run_worker(policy, receiver, stopping, n_processed))?;

        inner.sender = Some(sender);
        inner.handle = Some(handle);
        info!("Started job worker");
        Ok(())
    }

    /// Stops the worker and takes the policy back.
    ///
    /// The job being executed finishes. Jobs waiting in the queue and jobs
    /// submitted from now on fail with [`ReplayError::ShutDown`]. Stopping a
    /// queue that is not running does nothing.
    pub fn stop(&self) -> Result<()> {
        let handle = {
            let mut inner = lock(&self.inner);
            self.stopping.store(true, Ordering::SeqCst);
            // Dropping the only sender disconnects the channel once the
            // worker has drained it.
            inner.sender = None;
            inner.handle.take()
        };

        if let Some(handle) = handle {
            let policy = handle.join().map_err(|_| {
                ReplayError::InvalidState("job worker panicked outside of a job".into())
            })?;
            lock(&self.inner).policy = Some(policy);
            info!("Stopped job worker");
        }
        Ok(())
    }

    /// Returns `true` while the worker accepts jobs.
    pub fn is_running(&self) -> bool {
        lock(&self.inner).sender.is_some()
    }

    /// Number of jobs executed since the queue was created.
    pub fn n_processed(&self) -> usize {
        self.n_processed.load(Ordering::SeqCst)
    }

    /// Runs `job` on the worker and blocks until it returns.
    ///
    /// The error of the job, or [`ReplayError::JobPanicked`] if it panicked,
    /// is returned to this caller only; the worker keeps going.
    pub fn submit<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut P) -> Result<T> + Send + 'static,
    {
        let (done_s, done_r) = bounded(1);
        let job: Job<P> = Box::new(move |policy| {
            let result = match policy {
                Some(policy) => catch_unwind(AssertUnwindSafe(|| job(policy)))
                    .unwrap_or_else(|e| Err(ReplayError::JobPanicked(panic_message(&*e)).into())),
                None => Err(ReplayError::ShutDown.into()),
            };
            // The submitter may have gone away.
            let _ = done_s.send(result);
        });

        {
            let inner = lock(&self.inner);
            match &inner.sender {
                Some(sender) => sender
                    .send(job)
                    .map_err(|_| anyhow::Error::from(ReplayError::ShutDown))?,
                None => return Err(ReplayError::ShutDown.into()),
            }
        }

        done_r
            .recv()
            .unwrap_or_else(|_| Err(ReplayError::ShutDown.into()))
    }

    /// Stops the worker and returns the policy.
    pub fn into_policy(self) -> Result<P> {
        self.stop()?;
        let mut inner = lock(&self.inner);
        inner
            .policy
            .take()
            .ok_or_else(|| ReplayError::InvalidState("policy is not available".into()).into())
    }

    fn run_worker(
        mut policy: P,
        receiver: Receiver<Job<P>>,
        stopping: Arc<AtomicBool>,
        n_processed: Arc<AtomicUsize>,
    ) -> P {
        let mut n_rejected = 0;

        // Ends when the sender is dropped and the queue is empty.
        for job in receiver.iter() {
            if stopping.load(Ordering::SeqCst) {
                job(None);
                n_rejected += 1;
            } else {
                job(Some(&mut policy));
                n_processed.fetch_add(1, Ordering::SeqCst);
            }
        }

        if n_rejected > 0 {
            debug!("Rejected {} queued jobs at shutdown", n_rejected);
        }
        policy
    }
}

impl<P: Send + 'static> Drop for JobQueue<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop job worker: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
