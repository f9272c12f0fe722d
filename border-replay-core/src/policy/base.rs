//! Interface of replay policies.
use crate::{ExpRecord, ReplayError};
use anyhow::Result;

/// Capability set of a replay policy.
///
/// Only [`ReplayPolicy::len`] is mandatory. Calling `insert`, `sample` or
/// `start_sample_condition` on a policy that does not override them fails
/// with [`ReplayError::NotImplemented`]. `evict` defaults to evicting nothing.
///
/// # Examples
///
/// ```rust
/// use anyhow::Result;
/// use border_replay_core::{ExpRecord, ReplayPolicy};
///
/// struct KeepLast(Option<ExpRecord>);
///
/// impl ReplayPolicy for KeepLast {
///     type EvictArgs = ();
///
///     fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
///         Ok(self.0.replace(record).into_iter().collect())
///     }
///
///     fn len(&self) -> usize {
///         self.0.is_some() as usize
///     }
/// }
/// ```
pub trait ReplayPolicy: Send + 'static {
    /// Arguments of an active eviction sweep.
    type EvictArgs: Clone + Send + 'static;

    /// Inserts a record.
    ///
    /// Returns the records evicted to stay within capacity, possibly none.
    fn insert(&mut self, record: ExpRecord) -> Result<Vec<ExpRecord>> {
        let _ = record;
        Err(ReplayError::NotImplemented("ReplayPolicy::insert").into())
    }

    /// Samples exactly `n` records.
    ///
    /// Observation pointers of the returned records are not resolved.
    fn sample(&mut self, n: usize) -> Result<Vec<ExpRecord>> {
        let _ = n;
        Err(ReplayError::NotImplemented("ReplayPolicy::sample").into())
    }

    /// Actively evicts records and returns them.
    fn evict(&mut self, args: &Self::EvictArgs) -> Result<Vec<ExpRecord>> {
        let _ = args;
        Ok(vec![])
    }

    /// Returns `true` once the policy is ready to be sampled from.
    fn start_sample_condition(&self) -> Result<bool> {
        Err(ReplayError::NotImplemented("ReplayPolicy::start_sample_condition").into())
    }

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Returns `true` if no record is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
