//! Interface of the store client.
use crate::{ExpRecord, Observation, Pointer};
use anyhow::Result;

/// Operations of the store consumed by the replay engine.
///
/// Counter operations must be atomic per pointer, since several engine
/// instances and producers may update the same counters concurrently.
pub trait StoreClient: Send + Sync {
    /// Pushes a raw record to the tail of the queue `queue`.
    fn push_record(&self, queue: &str, record: ExpRecord) -> Result<()>;

    /// Pops the record at the head of the queue `queue`.
    ///
    /// Returns `Ok(None)` when the queue is empty; it does not block.
    fn pop_record(&self, queue: &str) -> Result<Option<ExpRecord>>;

    /// Stores an observation with its initial reference count.
    ///
    /// The count is the number of records that refer to the observation.
    fn put_obs(&self, ptr: &Pointer, obs: Observation, count: i64) -> Result<()>;

    /// Fetches observations in the order of `ptrs`.
    ///
    /// Fails if any pointer does not exist.
    fn get_obs(&self, ptrs: &[Pointer]) -> Result<Vec<Observation>>;

    /// Current reference count, `0` for an unknown pointer.
    fn get_count(&self, ptr: &Pointer) -> Result<i64>;

    /// Atomically adds 1 to the counter of each pointer, once per occurrence.
    fn incr_counts(&self, ptrs: &[Pointer]) -> Result<()>;

    /// Atomically subtracts 1 from the counter of each pointer, once per occurrence.
    ///
    /// Returns the new value for each element of `ptrs`. A counter is never
    /// made negative: decrementing a counter that is already `0` leaves it
    /// unchanged and yields `-1` for that element.
    fn decr_counts(&self, ptrs: &[Pointer]) -> Result<Vec<i64>>;

    /// Deletes the given keys with one round-trip.
    ///
    /// Deletes both observation objects (with their counters) and record slots.
    fn mdel(&self, ptrs: &[Pointer]) -> Result<()>;
}
