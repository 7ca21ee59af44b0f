//! Configuration of the adversarial IQN agent.
use super::{DiscriminatorConfig, IqnModelConfig, IqnSample, QuantileShuffle};
use crate::{model::SubModel, util::OutDim, Device};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    marker::PhantomData,
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
/// Network selecting the greedy next action of the bootstrapped target.
pub enum TargetAction {
    /// The target network of the frozen teacher agent.
    Teacher,

    /// The agent's own target network.
    Target,

    /// The agent's online network (double Q-learning).
    Online,
}

impl Default for TargetAction {
    fn default() -> Self {
        Self::Teacher
    }
}

#[derive(Deserialize, Serialize)]
/// Configuration of [`GanIqn`](super::GanIqn) agent.
pub struct GanIqnConfig<F, M, S>
where
    F: SubModel,
    M: SubModel,
    S: SubModel,
    F::Config: DeserializeOwned + Serialize + Clone,
    M::Config: DeserializeOwned + Serialize + Clone + OutDim,
    S::Config: DeserializeOwned + Serialize + Clone,
{
    pub(super) model_config: IqnModelConfig<F::Config, M::Config>,
    pub(super) critic_config: Option<DiscriminatorConfig<S::Config>>,
    pub(super) batch_size: usize,
    pub(super) discount_factor: f64,
    pub(super) multi_step: usize,
    pub(super) kappa: f64,
    pub(super) sample_percents_pred: IqnSample,
    pub(super) sample_percents_tgt: IqnSample,
    pub(super) sample_percents_act: IqnSample,
    pub(super) target_action: TargetAction,
    pub(super) quantile_shuffle: QuantileShuffle,
    pub(super) shuffle_seed: u64,
    pub(super) seed: Option<i64>,
    pub(super) target_update_interval: Option<usize>,
    pub(super) log_interval: usize,
    pub(super) grad_clip: Option<f64>,
    pub(super) check_finite: bool,
    pub(super) train: bool,
    pub device: Option<Device>,
    phantom: PhantomData<(F, M, S)>,
}

impl<F, M, S> Default for GanIqnConfig<F, M, S>
where
    F: SubModel,
    M: SubModel,
    S: SubModel,
    F::Config: DeserializeOwned + Serialize + Clone,
    M::Config: DeserializeOwned + Serialize + Clone + OutDim,
    S::Config: DeserializeOwned + Serialize + Clone,
{
    fn default() -> Self {
        Self {
            model_config: Default::default(),
            critic_config: None,
            batch_size: 32,
            discount_factor: 0.99,
            multi_step: 1,
            kappa: 1.0,
            sample_percents_pred: IqnSample::Uniform(64),
            sample_percents_tgt: IqnSample::Uniform(64),
            sample_percents_act: IqnSample::Uniform(32),
            target_action: TargetAction::Teacher,
            quantile_shuffle: QuantileShuffle::Independent,
            shuffle_seed: 0,
            seed: None,
            target_update_interval: Some(10000),
            log_interval: 100,
            grad_clip: None,
            check_finite: true,
            train: false,
            device: None,
            phantom: PhantomData,
        }
    }
}

impl<F, M, S> GanIqnConfig<F, M, S>
where
    F: SubModel,
    M: SubModel,
    S: SubModel,
    F::Config: DeserializeOwned + Serialize + Clone,
    M::Config: DeserializeOwned + Serialize + Clone + OutDim,
    S::Config: DeserializeOwned + Serialize + Clone,
{
    /// Sets the configuration of the value network.
    pub fn model_config(mut self, v: IqnModelConfig<F::Config, M::Config>) -> Self {
        self.model_config = v;
        self
    }

    /// Sets the configuration of the adversarial critic.
    pub fn critic_config(mut self, v: DiscriminatorConfig<S::Config>) -> Self {
        self.critic_config = Some(v);
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Number of steps accumulated in rewards of transitions.
    ///
    /// The bootstrapped term is discounted by `discount_factor^multi_step`.
    pub fn multi_step(mut self, v: usize) -> Self {
        self.multi_step = v;
        self
    }

    /// Threshold of the Huber loss.
    pub fn kappa(mut self, v: f64) -> Self {
        self.kappa = v;
        self
    }

    /// Sampling percent points for current states.
    pub fn sample_percent_pred(mut self, v: IqnSample) -> Self {
        self.sample_percents_pred = v;
        self
    }

    /// Sampling percent points for next states.
    pub fn sample_percent_tgt(mut self, v: IqnSample) -> Self {
        self.sample_percents_tgt = v;
        self
    }

    /// Sampling percent points for greedy actions.
    pub fn sample_percent_act(mut self, v: IqnSample) -> Self {
        self.sample_percents_act = v;
        self
    }

    /// Network selecting next actions.
    pub fn target_action(mut self, v: TargetAction) -> Self {
        self.target_action = v;
        self
    }

    /// Pairing of current and target quantile samples.
    pub fn quantile_shuffle(mut self, v: QuantileShuffle) -> Self {
        self.quantile_shuffle = v;
        self
    }

    /// Seed of the permutations of the fraction axis.
    pub fn shuffle_seed(mut self, v: u64) -> Self {
        self.shuffle_seed = v;
        self
    }

    /// Seed of the tch random number generator, set when the agent is built.
    pub fn seed(mut self, v: i64) -> Self {
        self.seed = Some(v);
        self
    }

    /// Interval of hard updates of the target network in optimization steps.
    ///
    /// `None` leaves the target network to the caller.
    pub fn target_update_interval(mut self, v: Option<usize>) -> Self {
        self.target_update_interval = v;
        self
    }

    /// Interval of the comparison with the teacher in optimization steps.
    pub fn log_interval(mut self, v: usize) -> Self {
        self.log_interval = v;
        self
    }

    /// Maximum global norm of gradients for both optimizers.
    pub fn grad_clip(mut self, v: Option<f64>) -> Self {
        self.grad_clip = v;
        self
    }

    /// Checks that losses are finite before each parameter update.
    pub fn check_finite(mut self, v: bool) -> Self {
        self.check_finite = v;
        self
    }

    /// Training mode.
    pub fn train(mut self, v: bool) -> Self {
        self.train = v;
        self
    }

    /// Device.
    pub fn device(mut self, device: tch::Device) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Constructs [`GanIqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GanIqnConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

impl<F, M, S> Clone for GanIqnConfig<F, M, S>
where
    F: SubModel,
    M: SubModel,
    S: SubModel,
    F::Config: DeserializeOwned + Serialize + Clone,
    M::Config: DeserializeOwned + Serialize + Clone + OutDim,
    S::Config: DeserializeOwned + Serialize + Clone,
{
    fn clone(&self) -> Self {
        Self {
            model_config: self.model_config.clone(),
            critic_config: self.critic_config.clone(),
            batch_size: self.batch_size,
            discount_factor: self.discount_factor,
            multi_step: self.multi_step,
            kappa: self.kappa,
            sample_percents_pred: self.sample_percents_pred.clone(),
            sample_percents_tgt: self.sample_percents_tgt.clone(),
            sample_percents_act: self.sample_percents_act.clone(),
            target_action: self.target_action,
            quantile_shuffle: self.quantile_shuffle,
            shuffle_seed: self.shuffle_seed,
            seed: self.seed,
            target_update_interval: self.target_update_interval,
            log_interval: self.log_interval,
            grad_clip: self.grad_clip,
            check_finite: self.check_finite,
            train: self.train,
            device: self.device,
            phantom: PhantomData,
        }
    }
}
