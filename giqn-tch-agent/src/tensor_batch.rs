//! Batch of transitions held as tensors.
use giqn_core::TransitionBatch;
use tch::Tensor;

/// A batch of transitions where observations and actions are [`Tensor`]s.
///
/// Observations have the shape `[batch_size, ...]` and actions have the
/// shape `[batch_size, 1]` with `Int64` action indices.
pub struct TensorBatch {
    /// Observations `o_t`.
    pub obs: Tensor,

    /// Actions `a_t`.
    pub act: Tensor,

    /// Observations `o_t+1`.
    pub next_obs: Tensor,

    /// Rewards `r_t`, already accumulated over multi-step returns.
    pub reward: Vec<f32>,

    /// Termination flags, 0 or 1.
    pub is_done: Vec<i8>,

    /// Indices of sampled transitions, for prioritized sampling.
    pub ix_sample: Option<Vec<usize>>,

    /// Importance-sampling weights, for prioritized sampling.
    pub weight: Option<Vec<f32>>,
}

impl TransitionBatch for TensorBatch {
    type ObsBatch = Tensor;
    type ActBatch = Tensor;

    fn unpack(
        self,
    ) -> (
        Tensor,
        Tensor,
        Tensor,
        Vec<f32>,
        Vec<i8>,
        Option<Vec<usize>>,
        Option<Vec<f32>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_done,
            self.ix_sample,
            self.weight,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }
}
