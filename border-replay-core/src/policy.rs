//! Replay policies.
//!
//! A policy decides which records are kept, which are sampled and which are
//! evicted. The engine only sees the [`ReplayPolicy`] interface; it owns the
//! policy on a single worker thread, so implementations need no locking.
//!
//! Two reference policies are provided:
//!
//! - [`FifoReplay`]: every record is sampled exactly once, oldest first
//! - [`UniformReplay`]: uniform sampling with replacement from a ring buffer
mod base;
mod config;
mod fifo;
mod uniform;
pub use base::ReplayPolicy;
pub use config::{FifoReplayConfig, UniformReplayConfig};
pub use fifo::FifoReplay;
pub use uniform::UniformReplay;
