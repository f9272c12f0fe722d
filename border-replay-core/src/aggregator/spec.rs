//! Specs of observations and actions.
use serde::{Deserialize, Serialize};

/// Shape of a single observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsSpec {
    /// Dimensions of the observation; a flattened observation has
    /// `shape.iter().product()` elements.
    pub shape: Vec<usize>,
}

impl ObsSpec {
    /// Creates a spec with the given shape.
    pub fn new(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            shape: shape.into(),
        }
    }

    /// Number of elements of a flattened observation.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Type of actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Real-valued action vector.
    Continuous,

    /// Index of one of `n` actions.
    Discrete {
        /// Number of actions.
        n: usize,
    },
}

/// Spec of actions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Dimensions of a continuous action. Ignored for discrete actions.
    pub dim: Vec<usize>,

    /// Type of actions.
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

impl ActionSpec {
    /// Continuous action with the given dimensions.
    pub fn continuous(dim: impl Into<Vec<usize>>) -> Self {
        Self {
            dim: dim.into(),
            kind: ActionKind::Continuous,
        }
    }

    /// Discrete action out of `n`.
    pub fn discrete(n: usize) -> Self {
        Self {
            dim: vec![1],
            kind: ActionKind::Discrete { n },
        }
    }

    /// Number of elements of an action.
    pub fn numel(&self) -> usize {
        match self.kind {
            ActionKind::Continuous => self.dim.iter().product(),
            ActionKind::Discrete { .. } => 1,
        }
    }
}
