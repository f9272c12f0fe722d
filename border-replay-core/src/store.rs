//! Client of the distributed key/counter store.
//!
//! The engine talks to the store only through [`StoreClient`]. The wire
//! protocol of a real store is out of scope of this crate;
//! [`InMemoryStore`] implements the interface for a single process and for tests.
mod base;
mod in_memory;
pub use base::StoreClient;
pub use in_memory::InMemoryStore;
