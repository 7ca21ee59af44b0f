//! Configuration of the adversarial critic.
use crate::{
    mlp::{Activation, MlpConfig},
    opt::OptimizerConfig,
    util::OutDim,
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Discriminator`](super::Discriminator).
///
/// The type parameter `S` is the configuration of the state encoder, whose
/// output dimension must be the input dimension of `state_head`.
pub struct DiscriminatorConfig<S> {
    /// Configuration of the state encoder.
    pub state_config: Option<S>,

    /// Head applied to state embeddings.
    pub state_head: MlpConfig,

    /// Head applied to one-hot actions. Its input dimension is the number of actions.
    pub action_head: MlpConfig,

    /// Head applied to individual quantile values.
    pub quantile_head: MlpConfig,

    /// Configuration of optimizer.
    pub opt_config: OptimizerConfig,
}

impl<S> DiscriminatorConfig<S>
where
    S: DeserializeOwned + Serialize,
{
    /// Creates a configuration with the default heads.
    ///
    /// * `state_dim` - Output dimension of the state encoder.
    /// * `n_actions` - Number of actions.
    pub fn new(state_config: S, state_dim: i64, n_actions: i64) -> Self {
        Self {
            state_config: Some(state_config),
            state_head: MlpConfig::new(state_dim, vec![1024], 512, true)
                .activation(Activation::LeakyRelu),
            action_head: MlpConfig::new(n_actions, vec![64], 128, true)
                .activation(Activation::LeakyRelu),
            quantile_head: MlpConfig::new(1, vec![64], 128, true)
                .activation(Activation::LeakyRelu),
            opt_config: OptimizerConfig::Adam { lr: 1e-2 },
        }
    }

    /// Sets the head applied to state embeddings.
    pub fn state_head(mut self, v: MlpConfig) -> Self {
        self.state_head = v;
        self
    }

    /// Sets the head applied to one-hot actions.
    pub fn action_head(mut self, v: MlpConfig) -> Self {
        self.action_head = v;
        self
    }

    /// Sets the head applied to quantile values.
    pub fn quantile_head(mut self, v: MlpConfig) -> Self {
        self.quantile_head = v;
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Number of actions.
    pub fn n_actions(&self) -> i64 {
        self.action_head.in_dim()
    }

    /// Input dimension of the output layer.
    pub(super) fn concat_dim(&self) -> i64 {
        self.quantile_head.get_out_dim()
            + self.state_head.get_out_dim()
            + self.action_head.get_out_dim()
    }

    /// Constructs [`DiscriminatorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DiscriminatorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
