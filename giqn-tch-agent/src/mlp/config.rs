use crate::util::OutDim;
use serde::{Deserialize, Serialize};

/// Activation function of hidden layers.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum Activation {
    /// Rectified linear unit.
    Relu,

    /// Leaky ReLU with the negative slope 0.01.
    LeakyRelu,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl Activation {
    pub(crate) fn apply(&self, x: &tch::Tensor) -> tch::Tensor {
        match self {
            Self::Relu => x.relu(),
            Self::LeakyRelu => x.leaky_relu(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp).
pub struct MlpConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) out_dim: i64,
    #[serde(default)]
    pub(super) activation: Activation,
    pub(super) activation_out: bool,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// * `activation_out` - If `true`, ReLU is applied to the output.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: i64, activation_out: bool) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation: Activation::Relu,
            activation_out,
        }
    }

    /// Sets the activation function of hidden layers.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// Returns the input dimension.
    pub fn in_dim(&self) -> i64 {
        self.in_dim
    }
}

impl OutDim for MlpConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: i64) {
        self.out_dim = out_dim;
    }
}
