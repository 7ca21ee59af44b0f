//! Replay buffer interface.
//!
//! Replay memory itself lives outside of this workspace. Agents only need
//! to draw batches from it and, for prioritized sampling, feed TD errors
//! back.
use super::TransitionBatch;
use anyhow::Result;

/// Interface of replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch: TransitionBatch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Samples a batch of `size` transitions.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates the priorities of the transitions at `ixs` with `td_err`.
    ///
    /// Buffers without prioritized sampling ignore the call.
    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_err: &Option<Vec<f32>>);
}
