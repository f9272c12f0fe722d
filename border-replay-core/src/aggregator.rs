//! Conversion of materialized experiences into training batches.
mod base;
mod spec;
mod stack;
pub use base::BatchAggregator;
pub use spec::{ActionKind, ActionSpec, ObsSpec};
pub use stack::{ExpBatch, StackAggregator};
