//! Utilities.
mod quantile_loss;
use crate::model::ModelBase;
use anyhow::Result;
use log::trace;
pub use quantile_loss::{huber_loss, quantile_huber_loss};
use tch::Tensor;

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Copies the parameters of `src` into `dest`.
///
/// Variables are identified by their names. The copy does not go through
/// autograd, so `dest` may be frozen.
pub fn hard_update<M: ModelBase>(dest: &mut M, src: &M) -> Result<()> {
    tch::no_grad(|| dest.get_var_store_mut().copy(src.get_var_store()))?;
    trace!("hard update");
    Ok(())
}

/// Returns `true` if every element of `t` is finite.
pub fn is_finite(t: &Tensor) -> bool {
    t.isfinite().all().int64_value(&[]) != 0
}
