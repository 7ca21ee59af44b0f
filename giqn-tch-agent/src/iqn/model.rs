//! IQN model.
mod config;
use super::IqnSample;
use crate::{
    model::{ModelBase, SubModel},
    opt::{Optimizer, OptimizerConfig},
};
use anyhow::{Context, Result};
pub use config::IqnModelConfig;
use log::{info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::{f64::consts::PI, path::Path};
use tch::{
    nn,
    nn::{Module, VarStore},
    Device,
    Kind::Float,
    Tensor,
};

/// Implicit quantile network.
///
/// Maps observations to state embeddings with the feature extractor `F`,
/// merges them with cosine embeddings of quantile fractions and maps the
/// result to action-value quantiles with `M`.
///
/// A forward pass is split into [`IqnModel::embed`] and
/// [`IqnModel::quantiles`] so that one state embedding can be reused for
/// every set of fractions evaluated in the same pass.
pub struct IqnModel<F, M>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
{
    device: Device,
    var_store: nn::VarStore,

    // Dimension of the feature vector, the last axis of the output of `psi`.
    feature_dim: i64,

    // Dimension of the cosine embedding vector.
    embed_dim: i64,

    // Number of actions.
    out_dim: i64,

    // Feature extractor
    psi: F,

    // Projection of cosine embedding to the feature space
    phi: nn::Linear,

    // Merge network
    f: M,

    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<F, M> IqnModel<F, M>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    F::Config: DeserializeOwned + Serialize,
    M::Config: DeserializeOwned + Serialize,
{
    /// Constructs [`IqnModel`].
    ///
    /// `out_dim` is the number of actions, which has to agree with the output
    /// dimension of the merge network.
    pub fn build(
        config: IqnModelConfig<F::Config, M::Config>,
        out_dim: i64,
        device: Device,
    ) -> Result<Self> {
        let f_config = config.f_config.context("f_config is not set.")?;
        let m_config = config.m_config.context("m_config is not set.")?;
        let var_store = nn::VarStore::new(device);
        let p = &var_store.root();
        let psi = F::build(&(p / "psi"), f_config);
        let phi = Self::cos_embed_nn(p, config.feature_dim, config.embed_dim);
        let f = M::build(&(p / "f"), m_config);
        let opt = config.opt_config.build(&var_store)?;

        Ok(Self {
            device,
            var_store,
            feature_dim: config.feature_dim,
            embed_dim: config.embed_dim,
            out_dim,
            psi,
            phi,
            f,
            opt_config: config.opt_config,
            opt,
        })
    }
}

impl<F, M> IqnModel<F, M>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
{
    fn cos_embed_nn(p: &nn::Path, feature_dim: i64, embed_dim: i64) -> nn::Linear {
        nn::linear(p / "phi", embed_dim, feature_dim, Default::default())
    }

    /// Cosine embedding of fractions, eq. (4) in the paper.
    ///
    /// `[batch_size, n_percent_points]` -> `[batch_size, n_percent_points, feature_dim]`.
    fn embed_fractions(&self, tau: &Tensor) -> Tensor {
        let size = tau.size();
        let (batch_size, n_percent_points) = (size[0], size[1]);
        let i = Tensor::arange_start(1, self.embed_dim + 1, (Float, self.device))
            .unsqueeze(0)
            .unsqueeze(0);
        let cos = (tau.to(self.device).unsqueeze(-1) * (i * PI)).cos();
        debug_assert_eq!(
            cos.size().as_slice(),
            &[batch_size, n_percent_points, self.embed_dim]
        );
        self.phi.forward(&cos).relu()
    }

    /// Returns state embeddings with the shape `[batch_size, feature_dim]`.
    pub fn embed(&self, x: &Tensor) -> Tensor {
        let psi = self.psi.forward(x);
        debug_assert_eq!(psi.size().as_slice()[1], self.feature_dim);
        psi
    }

    /// Returns action-value quantiles at fractions `tau`.
    ///
    /// * `tau` has the shape `[batch_size, n_percent_points]`.
    /// * `embedding` has the shape `[batch_size, feature_dim]`.
    /// * The output has the shape `[batch_size, n_percent_points, n_actions]`.
    pub fn quantiles(&self, tau: &Tensor, embedding: &Tensor) -> Tensor {
        let size = tau.size();
        let (batch_size, n_percent_points) = (size[0], size[1]);
        assert!(
            n_percent_points >= 1,
            "The number of fractions must be positive"
        );
        assert_eq!(
            embedding.size().as_slice(),
            &[batch_size, self.feature_dim],
            "State embeddings do not match fractions"
        );

        let phi = self.embed_fractions(tau);
        let m = embedding.unsqueeze(1) * phi;
        debug_assert_eq!(
            m.size().as_slice(),
            &[batch_size, n_percent_points, self.feature_dim]
        );

        let z = self.f.forward(&m);
        debug_assert_eq!(
            z.size().as_slice(),
            &[batch_size, n_percent_points, self.out_dim]
        );
        z
    }

    /// Returns the tensor of action-value quantiles of observations `x`.
    pub fn forward(&self, x: &Tensor, tau: &Tensor) -> Tensor {
        self.quantiles(tau, &self.embed(x))
    }

    /// Returns action values `[batch_size, n_actions]`, the means of the
    /// quantiles over fractions `tau`.
    pub fn q_values(&self, embedding: &Tensor, tau: &Tensor) -> Tensor {
        self.quantiles(tau, embedding)
            .mean_dim(Some([1i64].as_slice()), false, Float)
    }

    /// Returns greedy actions `[batch_size, 1]` with respect to action values
    /// averaged over fractions sampled by `mode`.
    pub fn greedy_action(&self, embedding: &Tensor, mode: &IqnSample) -> Tensor {
        let batch_size = embedding.size()[0];
        let tau = mode.sample(batch_size, self.device);
        self.q_values(embedding, &tau).argmax(-1, true)
    }

    /// Number of actions.
    pub fn out_dim(&self) -> i64 {
        self.out_dim
    }

    /// Dimension of state embeddings.
    pub fn feature_dim(&self) -> i64 {
        self.feature_dim
    }

    /// Device on which parameters are allocated.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Disables gradient tracking of all parameters.
    pub fn freeze(&mut self) {
        self.var_store.freeze();
    }

    /// Returns `true` if no parameter tracks gradients.
    pub fn is_frozen(&self) -> bool {
        self.var_store
            .trainable_variables()
            .iter()
            .all(|t| !t.requires_grad())
    }
}

impl<F, M> Clone for IqnModel<F, M>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
{
    /// Creates a network with the same architecture and parameter values.
    ///
    /// Gradients of the clone are tracked regardless of the source.
    fn clone(&self) -> Self {
        let device = self.device;
        let opt_config = self.opt_config.clone();
        let mut var_store = nn::VarStore::new(device);
        let p = &var_store.root();
        let psi = self.psi.clone_with_path(&(p / "psi"));
        let phi = Self::cos_embed_nn(p, self.feature_dim, self.embed_dim);
        let f = self.f.clone_with_path(&(p / "f"));
        let opt = opt_config
            .build(&var_store)
            .expect("Optimizer config was validated when the source was built");
        var_store
            .copy(&self.var_store)
            .expect("Variables of a clone have the names of the source");

        Self {
            device,
            var_store,
            feature_dim: self.feature_dim,
            embed_dim: self.embed_dim,
            out_dim: self.out_dim,
            psi,
            phi,
            f,
            opt_config,
            opt,
        }
    }
}

impl<F, M> ModelBase for IqnModel<F, M>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
{
    fn backward_step(&mut self, loss: &Tensor) {
        self.opt.backward_step(loss);
    }

    fn get_var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.var_store
    }

    fn get_var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.var_store.save(&path)?;
        info!("Save IQN model to {:?}", path.as_ref());
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load IQN model from {:?}", path.as_ref());
        Ok(())
    }
}

impl<F, M> IqnModel<F, M>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
{
    /// Applies a backward step, clipping the global gradient norm if
    /// `max_norm` is given.
    pub fn backward_step_clip(&mut self, loss: &Tensor, max_norm: Option<f64>) {
        match max_norm {
            Some(max_norm) => self.opt.backward_step_clip_norm(loss, max_norm),
            None => self.opt.backward_step(loss),
        }
    }
}

/// Gathers quantiles at the given actions.
///
/// * `z` has the shape `[batch_size, n_percent_points, n_actions]`.
/// * `act` has the shape `[batch_size, 1]` and holds action indices.
/// * The output has the shape `[batch_size, n_percent_points, 1]`.
pub fn select_action_quantiles(z: &Tensor, act: &Tensor) -> Tensor {
    let size = z.size();
    let (batch_size, n_percent_points) = (size[0], size[1]);
    assert_eq!(
        act.size().as_slice(),
        &[batch_size, 1],
        "Actions must have the shape [batch_size, 1]"
    );
    let a = act
        .to_kind(tch::Kind::Int64)
        .to(z.device())
        .unsqueeze(1)
        .repeat(&[1, n_percent_points, 1]);
    let q = z.gather(2, &a, false);
    debug_assert_eq!(q.size().as_slice(), &[batch_size, n_percent_points, 1]);
    q
}
