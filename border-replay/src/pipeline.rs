//! Bounded producer/consumer pipelines around the job queue.
//!
//! * [`ExpQueue`] pulls raw records from the store and feeds them to `insert`.
//! * [`ObsFetchQueue`] samples, reserves and fetches batches ahead of demand.
//!
//! Both hold their items in a [`BoundedBuffer`]; a full buffer blocks its
//! producer, which is what bounds memory use.
mod buffer;
mod exp_queue;
mod obs_fetch_queue;
pub use buffer::BoundedBuffer;
pub use exp_queue::ExpQueue;
pub use obs_fetch_queue::{FetchedBatch, ObsFetchQueue, Reservation};
