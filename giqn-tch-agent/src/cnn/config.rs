use crate::util::OutDim;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`AtariCnn`](super::AtariCnn).
pub struct AtariCnnConfig {
    pub(super) n_stack: i64,
    pub(super) out_dim: i64,
    #[serde(default)]
    pub(super) skip_linear: bool,
}

impl AtariCnnConfig {
    /// Creates configuration of the CNN.
    pub fn new(n_stack: i64, out_dim: i64) -> Self {
        Self {
            n_stack,
            out_dim,
            skip_linear: false,
        }
    }

    /// If `true`, linear layers are omitted and the network outputs the
    /// 3136 features of the last convolution.
    pub fn skip_linear(mut self, v: bool) -> Self {
        self.skip_linear = v;
        self
    }
}

impl OutDim for AtariCnnConfig {
    /// Gets output dimension.
    fn get_out_dim(&self) -> i64 {
        match self.skip_linear {
            true => super::base::N_CONV_FEATURES,
            false => self.out_dim,
        }
    }

    /// Sets output dimension.
    fn set_out_dim(&mut self, v: i64) {
        self.out_dim = v;
    }
}
