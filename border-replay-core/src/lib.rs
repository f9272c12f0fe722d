#![warn(missing_docs)]
//! Data model and collaborator interfaces of a distributed replay buffer.
//!
//! The engine in `border-replay` is generic over three collaborators defined
//! here:
//!
//! * [`StoreClient`] - key/counter store holding raw records and observations
//! * [`ReplayPolicy`] - decides what is stored, sampled and evicted
//! * [`BatchAggregator`] - turns materialized experiences into a training batch
pub mod aggregator;
mod config;
mod error;
pub mod policy;
mod record;
pub mod store;

pub use aggregator::{ActionSpec, BatchAggregator, ExpBatch, ObsSpec, StackAggregator};
pub use config::ReplayConfig;
pub use error::ReplayError;
pub use policy::ReplayPolicy;
pub use record::{obs_pointers_of, ExpRecord, Experience, Observation, Pointer};
pub use store::{InMemoryStore, StoreClient};
