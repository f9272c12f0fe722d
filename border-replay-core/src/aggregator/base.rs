use crate::Experience;
use anyhow::Result;

/// Converts a list of materialized experiences into a training batch.
pub trait BatchAggregator: Send + Sync + 'static {
    /// Batch handed to the training loop.
    type Batch;

    /// Aggregates `experiences` into a batch.
    ///
    /// Fails with [`ReplayError::ShapeMismatch`](crate::ReplayError::ShapeMismatch)
    /// if an experience disagrees with the specs of the aggregator.
    fn aggregate(&self, experiences: Vec<Experience>) -> Result<Self::Batch>;
}
