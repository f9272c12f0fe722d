//! Experience records and handles into the store.
//!
//! A producer uploads observations as separate, reference-counted objects and
//! then pushes an [`ExpRecord`] that refers to them by [`Pointer`]. The replay
//! keeps only the records; observations are fetched when a batch is sampled,
//! giving an [`Experience`].
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle into the store.
///
/// Used both for observation objects and for the storage slot of a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pointer(pub String);

impl Pointer {
    /// Creates a pointer from anything convertible into a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key of the pointer.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pointer {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Payload stored behind an observation pointer.
pub type Observation = Vec<f32>;

/// Experience record as pushed by producers and held by replay policies.
///
/// Observations are not embedded; `obs_pointers` refers to them in the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpRecord {
    /// Handles of the observations of this transition, possibly empty.
    #[serde(default)]
    pub obs_pointers: Vec<Pointer>,

    /// Reward.
    pub reward: f32,

    /// Action.
    pub action: Vec<f32>,

    /// Auxiliary information, carried through untouched.
    #[serde(default)]
    pub info: serde_json::Value,

    /// Handle of the storage slot of the record itself, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_pointer: Option<Pointer>,
}

impl ExpRecord {
    /// Creates a record without an `exp_pointer` and with empty `info`.
    pub fn new(obs_pointers: Vec<Pointer>, reward: f32, action: Vec<f32>) -> Self {
        Self {
            obs_pointers,
            reward,
            action,
            info: serde_json::Value::Null,
            exp_pointer: None,
        }
    }

    /// Sets `exp_pointer`.
    pub fn exp_pointer(mut self, ptr: impl Into<Pointer>) -> Self {
        self.exp_pointer = Some(ptr.into());
        self
    }

    /// Sets `info`.
    pub fn info(mut self, info: serde_json::Value) -> Self {
        self.info = info;
        self
    }

    /// Resolves the observation pointers with the fetched observations.
    ///
    /// `obs` must be in the order of `obs_pointers`.
    pub fn materialize(self, obs: Vec<Observation>) -> Experience {
        Experience {
            obs,
            reward: self.reward,
            action: self.action,
            info: self.info,
        }
    }
}

/// A record whose observations have been fetched from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Experience {
    /// Observations, in the order of the record's `obs_pointers`.
    pub obs: Vec<Observation>,

    /// Reward.
    pub reward: f32,

    /// Action.
    pub action: Vec<f32>,

    /// Auxiliary information.
    pub info: serde_json::Value,
}

/// Collects all observation pointers of `records`, keeping duplicates.
///
/// Every occurrence stands for one reference, so duplicates must be counted.
pub fn obs_pointers_of<'a>(records: impl IntoIterator<Item = &'a ExpRecord>) -> Vec<Pointer> {
    records
        .into_iter()
        .flat_map(|r| r.obs_pointers.iter().cloned())
        .collect()
}
