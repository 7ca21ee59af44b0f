//! Optimizers.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{
    nn::{Adam, AdamW, Optimizer as Optimizer_, OptimizerConfig as OptimizerConfig_, VarStore},
    Tensor,
};

/// Configures an optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },

    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        beta1: f64,
        beta2: f64,
        wd: f64,
        eps: f64,
        amsgrad: bool,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 5e-5 }
    }
}

impl OptimizerConfig {
    /// Constructs an optimizer over the trainable variables of `vs`.
    pub fn build(&self, vs: &VarStore) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::Adam { lr } => {
                let opt = Adam::default().build(vs, *lr)?;
                Ok(Optimizer::Adam(opt))
            }
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                wd,
                eps,
                amsgrad,
            } => {
                let opt = AdamW {
                    beta1: *beta1,
                    beta2: *beta2,
                    wd: *wd,
                    eps: *eps,
                    amsgrad: *amsgrad,
                }
                .build(vs, *lr)?;
                Ok(Optimizer::AdamW(opt))
            }
        }
    }
}

/// Optimizers.
///
/// This is a thin wrapper of [tch::nn::Optimizer].
///
/// [tch::nn::Optimizer]: https://docs.rs/tch/0.16.0/tch/nn/struct.Optimizer.html
pub enum Optimizer {
    /// Adam optimizer.
    Adam(Optimizer_),

    /// AdamW optimizer.
    AdamW(Optimizer_),
}

impl Optimizer {
    fn inner(&mut self) -> &mut Optimizer_ {
        match self {
            Self::Adam(opt) => opt,
            Self::AdamW(opt) => opt,
        }
    }

    /// Zeroes gradients, backpropagates `loss` and applies a step.
    pub fn backward_step(&mut self, loss: &Tensor) {
        self.inner().backward_step(loss);
    }

    /// Same as [`Optimizer::backward_step`], with the global norm of the
    /// gradients clipped to `max_norm` before the step.
    pub fn backward_step_clip_norm(&mut self, loss: &Tensor, max_norm: f64) {
        self.inner().backward_step_clip_norm(loss, max_norm);
    }

    /// Zeroes the gradients of the trainable variables.
    pub fn zero_grad(&mut self) {
        self.inner().zero_grad();
    }
}
