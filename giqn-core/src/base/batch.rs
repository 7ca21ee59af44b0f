//! Batch.

/// A batch of transitions sampled from a replay buffer.
///
/// Each item is `(o_t, a_t, o_t+1, r_t, is_done_t)`. Buffers with
/// prioritized sampling also attach the sampled indices and the
/// importance-sampling weights.
pub trait TransitionBatch {
    /// A set of observations in a batch.
    type ObsBatch;

    /// A set of actions in a batch.
    type ActBatch;

    /// Unpack the data `(o_t, a_t, o_t+1, r_t, is_done_t, ixs, weight)`.
    #[allow(clippy::type_complexity)]
    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Option<Vec<usize>>,
        Option<Vec<f32>>,
    );

    /// Returns the number of transitions.
    fn len(&self) -> usize;

    /// Returns `true` if the batch has no transitions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
