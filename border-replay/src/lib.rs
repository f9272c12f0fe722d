#![warn(missing_docs)]
//! Concurrency and lifecycle engine of a distributed experience replay.
//!
//! [`Replay`] wires a [`ReplayPolicy`](border_replay_core::ReplayPolicy), a
//! [`StoreClient`](border_replay_core::StoreClient) and a
//! [`BatchAggregator`](border_replay_core::BatchAggregator) together:
//!
//! * [`JobQueue`] runs every operation on the policy one at a time,
//! * [`ExpQueue`] moves raw records from the store into the policy,
//! * [`ObsFetchQueue`] keeps sampled batches with their observations ready,
//! * [`RefCounter`] deletes observations nobody refers to any more.
//!
//! ```rust,no_run
//! use anyhow::Result;
//! use border_replay::Replay;
//! use border_replay_core::{
//!     policy::{UniformReplay, UniformReplayConfig},
//!     ActionSpec, InMemoryStore, ObsSpec, ReplayConfig, StackAggregator,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let replay = Replay::new(
//!         ReplayConfig::new(32).name("replay"),
//!         UniformReplay::build(&UniformReplayConfig::default()),
//!         Arc::new(InMemoryStore::new()),
//!         StackAggregator::new(ObsSpec::new([4]), ActionSpec::discrete(2)),
//!     )?;
//!     replay.start_queue_threads()?;
//!     for batch in replay.sample_iterator(|| true).take(10) {
//!         println!("{}", batch?.len());
//!     }
//!     replay.stop_queue_threads()
//! }
//! ```
mod evict_thread;
mod job_queue;
mod pipeline;
mod ref_counter;
mod replay;
mod stats;
mod thread;

pub use border_replay_core;
pub use job_queue::JobQueue;
pub use pipeline::{BoundedBuffer, ExpQueue, FetchedBatch, ObsFetchQueue, Reservation};
pub use ref_counter::RefCounter;
pub use replay::{Replay, SampleIter};
pub use stats::{ReplayStats, ReplayStatsSnapshot};
pub use thread::{LoopThread, StopFlag, ThreadState};
