//! The replay engine.
mod base;
mod iter;
mod shared;
pub use base::Replay;
pub use iter::SampleIter;
pub(crate) use shared::ReplayCore;
