use super::Replay;
use anyhow::Result;
use border_replay_core::{BatchAggregator, ReplayError, ReplayPolicy};

/// Lazy sequence of batches returned by [`Replay::sample_iterator`].
///
/// Each item comes from [`Replay::sample`] and blocks like it. The sequence
/// ends once `stop_condition` returns `false`, or for good once the prefetch
/// pipeline is stopped.
pub struct SampleIter<'a, P, G, F>
where
    P: ReplayPolicy,
    G: BatchAggregator,
    F: FnMut() -> bool,
{
    replay: &'a Replay<P, G>,
    stop_condition: F,
    done: bool,
}

impl<'a, P, G, F> SampleIter<'a, P, G, F>
where
    P: ReplayPolicy,
    G: BatchAggregator,
    F: FnMut() -> bool,
{
    pub(super) fn new(replay: &'a Replay<P, G>, stop_condition: F) -> Self {
        Self {
            replay,
            stop_condition,
            done: false,
        }
    }
}

impl<'a, P, G, F> Iterator for SampleIter<'a, P, G, F>
where
    P: ReplayPolicy,
    G: BatchAggregator,
    F: FnMut() -> bool,
{
    type Item = Result<G::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || !(self.stop_condition)() {
            self.done = true;
            return None;
        }
        match self.replay.sample() {
            Err(e) if ReplayError::is_stop(&e) => {
                self.done = true;
                None
            }
            res => Some(res),
        }
    }
}

impl<'a, P, G, F> std::iter::FusedIterator for SampleIter<'a, P, G, F>
where
    P: ReplayPolicy,
    G: BatchAggregator,
    F: FnMut() -> bool,
{
}
