//! Background threads with cooperative stop.
use border_replay_core::ReplayError;
use anyhow::Result;
use log::{info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Longest uninterrupted sleep of [`StopFlag::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Locks `mutex`, recovering the guard if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared flag asking a loop to stop.
///
/// Loops check the flag at each blocking boundary.
#[derive(Clone, Debug)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Creates a flag, raised or not.
    pub fn new(raised: bool) -> Self {
        Self(Arc::new(AtomicBool::new(raised)))
    }

    /// Returns `true` if a stop was requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Requests a stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears the request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Sleeps for `duration`, returning early once the flag is raised.
    ///
    /// Returns `true` if the whole duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_raised() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Lifecycle of a [`LoopThread`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Built, never started.
    Created,
    /// The loop is running.
    Running,
    /// Stop requested, not joined yet.
    Stopping,
    /// Joined.
    Stopped,
}

/// A named thread running a loop until its [`StopFlag`] is raised.
///
/// The flag is raised while the thread is not running, so blocking calls
/// made against a stopped loop return instead of waiting for it.
pub struct LoopThread {
    name: String,
    stop: StopFlag,
    state: ThreadState,
    handle: Option<JoinHandle<()>>,
}

impl LoopThread {
    /// Creates a thread handle without spawning.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop: StopFlag::new(true),
            state: ThreadState::Created,
            handle: None,
        }
    }

    /// Name of the thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Flag observed by the loop.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Spawns the loop. `body` receives the stop flag and must return once it is raised.
    pub fn start<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        match self.state {
            ThreadState::Running => {
                return Err(ReplayError::AlreadyRunning(self.name.clone()).into());
            }
            ThreadState::Stopping => {
                return Err(ReplayError::InvalidState(format!(
                    "{} is stopping and has not been joined",
                    self.name
                ))
                .into());
            }
            ThreadState::Created | ThreadState::Stopped => {}
        }

        self.stop.reset();
        let stop = self.stop.clone();
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body(stop))?;
        self.handle = Some(handle);
        self.state = ThreadState::Running;
        info!("Started thread {}", self.name);
        Ok(())
    }

    /// Requests the loop to stop without waiting for it.
    pub fn stop(&mut self) {
        self.stop.raise();
        if self.state == ThreadState::Running {
            self.state = ThreadState::Stopping;
        }
    }

    /// Waits until the loop returns. Does nothing if the thread was never started.
    pub fn join(&mut self) -> Result<()> {
        let result: Result<()> = match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                warn!("Thread {} panicked", self.name);
                ReplayError::InvalidState(format!("thread {} panicked", self.name)).into()
            }),
            None => Ok(()),
        };
        if self.state != ThreadState::Created {
            self.state = ThreadState::Stopped;
            info!("Stopped thread {}", self.name);
        }
        result
    }

    /// Stops and joins the loop.
    pub fn stop_and_join(&mut self) -> Result<()> {
        self.stop();
        self.join()
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop_and_join();
        }
    }
}
