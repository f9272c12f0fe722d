//! Periodic active eviction.
use crate::{replay::ReplayCore, thread::LoopThread};
use anyhow::Result;
use border_replay_core::{ReplayError, ReplayPolicy};
use log::{debug, trace, warn};
use std::{sync::Arc, time::Duration};

/// Thread calling `evict` with fixed arguments every `sleep_interval`.
///
/// Each round goes through the job queue and cleans up the evicted records
/// exactly like an eviction triggered by `insert`.
pub(crate) struct EvictThread {
    thread: LoopThread,
    sleep_interval: Duration,
}

impl EvictThread {
    /// Spawns the thread.
    pub(crate) fn start<P: ReplayPolicy>(
        core: Arc<ReplayCore<P>>,
        args: P::EvictArgs,
        sleep_interval: Duration,
    ) -> Result<Self> {
        let mut thread = LoopThread::new("replay-evict");
        thread.start(move |stop| {
            while !stop.is_raised() {
                match core.evict(args.clone()) {
                    Ok(evicted) => trace!("Evicted {} records", evicted.len()),
                    Err(e) if ReplayError::is_stop(&e) => {
                        debug!("Eviction skipped, job queue is not running")
                    }
                    Err(e) => warn!("Failed to evict: {}", e),
                }
                stop.sleep(sleep_interval);
            }
        })?;
        Ok(Self {
            thread,
            sleep_interval,
        })
    }

    pub(crate) fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    /// Stops and joins the thread.
    pub(crate) fn stop(mut self) -> Result<()> {
        self.thread.stop_and_join()
    }
}
