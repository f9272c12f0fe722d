//! Aggregator stacking fields of experiences.
use super::{ActionKind, ActionSpec, BatchAggregator, ObsSpec};
use crate::{Experience, ReplayError};
use anyhow::Result;

/// Batch of experiences with each field stacked along the first dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpBatch {
    /// Stacked observations, one entry per observation slot.
    ///
    /// `obs[k]` has `batch_size * obs_spec.numel()` elements; the `i`-th chunk
    /// is the `k`-th observation of the `i`-th experience.
    pub obs: Vec<Vec<f32>>,

    /// Stacked actions, `batch_size * action_spec.numel()` elements.
    pub action: Vec<f32>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Auxiliary information of each experience.
    pub info: Vec<serde_json::Value>,

    /// Shape of a single observation.
    pub obs_shape: Vec<usize>,
}

impl ExpBatch {
    /// Number of experiences in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no experience.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }
}

/// Default [`BatchAggregator`] producing [`ExpBatch`].
#[derive(Clone, Debug)]
pub struct StackAggregator {
    obs_spec: ObsSpec,
    action_spec: ActionSpec,
}

impl StackAggregator {
    /// Creates an aggregator checking experiences against the given specs.
    pub fn new(obs_spec: ObsSpec, action_spec: ActionSpec) -> Self {
        Self {
            obs_spec,
            action_spec,
        }
    }

    fn check_action(&self, i: usize, action: &[f32]) -> Result<()> {
        let numel = self.action_spec.numel();
        if action.len() != numel {
            return Err(ReplayError::ShapeMismatch(format!(
                "action of experience {} has {} elements, expected {}",
                i,
                action.len(),
                numel
            ))
            .into());
        }
        if let ActionKind::Discrete { n } = self.action_spec.kind {
            let a = action[0];
            if a < 0.0 || a.fract() != 0.0 || a as usize >= n {
                return Err(ReplayError::ShapeMismatch(format!(
                    "discrete action {} of experience {} is not an index below {}",
                    a, i, n
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl BatchAggregator for StackAggregator {
    type Batch = ExpBatch;

    fn aggregate(&self, experiences: Vec<Experience>) -> Result<ExpBatch> {
        let batch_size = experiences.len();
        let n_slots = experiences.first().map_or(0, |e| e.obs.len());
        let obs_numel = self.obs_spec.numel();
        let act_numel = self.action_spec.numel();

        let mut obs = vec![Vec::with_capacity(batch_size * obs_numel); n_slots];
        let mut action = Vec::with_capacity(batch_size * act_numel);
        let mut reward = Vec::with_capacity(batch_size);
        let mut info = Vec::with_capacity(batch_size);

        for (i, exp) in experiences.into_iter().enumerate() {
            if exp.obs.len() != n_slots {
                return Err(ReplayError::ShapeMismatch(format!(
                    "experience {} has {} observations, expected {}",
                    i,
                    exp.obs.len(),
                    n_slots
                ))
                .into());
            }
            for (k, o) in exp.obs.iter().enumerate() {
                if o.len() != obs_numel {
                    return Err(ReplayError::ShapeMismatch(format!(
                        "observation {} of experience {} has {} elements, expected {} for shape {:?}",
                        k,
                        i,
                        o.len(),
                        obs_numel,
                        self.obs_spec.shape
                    ))
                    .into());
                }
                obs[k].extend_from_slice(o);
            }
            self.check_action(i, &exp.action)?;
            action.extend_from_slice(&exp.action);
            reward.push(exp.reward);
            info.push(exp.info);
        }

        Ok(ExpBatch {
            obs,
            action,
            reward,
            info,
            obs_shape: self.obs_spec.shape.clone(),
        })
    }
}
