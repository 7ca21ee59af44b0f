//! Agents and a fixed replay buffer shared by the integration tests.
#![allow(dead_code)]
use anyhow::{ensure, Result};
use giqn_core::ReplayBufferBase;
use giqn_tch_agent::{
    iqn::{
        DiscriminatorConfig, Frozen, GanIqn, GanIqnConfig, IqnModelConfig, IqnSample,
        QuantileShuffle, TargetAction,
    },
    mlp::{Activation, Mlp, MlpConfig},
    opt::OptimizerConfig,
    TensorBatch,
};
use std::rc::Rc;
use tch::{Device, Kind, Tensor};

pub const OBS_DIM: i64 = 4;
pub const FEATURE_DIM: i64 = 16;
pub const N_ACTIONS: i64 = 3;
pub const BATCH_SIZE: usize = 8;
pub const N_PERCENT_POINTS: i64 = 4;

pub type Agent = GanIqn<Mlp, Mlp, Mlp, FixedBuffer>;
pub type Config = GanIqnConfig<Mlp, Mlp, Mlp>;

pub fn model_config(n_actions: i64) -> IqnModelConfig<MlpConfig, MlpConfig> {
    IqnModelConfig::default()
        .feature_dim(FEATURE_DIM)
        .embed_dim(8)
        .f_config(MlpConfig::new(OBS_DIM, vec![16], FEATURE_DIM, true))
        .m_config(MlpConfig::new(FEATURE_DIM, vec![16], n_actions, false))
        .opt_config(OptimizerConfig::Adam { lr: 1e-3 })
}

pub fn critic_config(n_actions: i64) -> DiscriminatorConfig<MlpConfig> {
    DiscriminatorConfig::new(MlpConfig::new(OBS_DIM, vec![16], 16, true), 16, n_actions)
        .state_head(MlpConfig::new(16, vec![16], 16, true).activation(Activation::LeakyRelu))
        .action_head(MlpConfig::new(n_actions, vec![8], 8, true).activation(Activation::LeakyRelu))
        .quantile_head(MlpConfig::new(1, vec![8], 8, true).activation(Activation::LeakyRelu))
        .opt_config(OptimizerConfig::Adam { lr: 1e-2 })
}

/// Configuration with deterministic action selection and pairing.
pub fn config(target_action: TargetAction, n_actions: i64, batch_size: usize) -> Config {
    Config::default()
        .model_config(model_config(n_actions))
        .critic_config(critic_config(n_actions))
        .batch_size(batch_size)
        .sample_percent_pred(IqnSample::Uniform(N_PERCENT_POINTS))
        .sample_percent_tgt(IqnSample::Uniform(N_PERCENT_POINTS))
        .sample_percent_act(IqnSample::Evenly(8))
        .target_action(target_action)
        .quantile_shuffle(QuantileShuffle::Disabled)
        .target_update_interval(None)
        .log_interval(2)
        .seed(42)
        .train(true)
        .device(Device::Cpu)
}

pub fn teacher(n_actions: i64) -> Rc<Frozen<Agent>> {
    let agent = Agent::build(config(TargetAction::Target, n_actions, BATCH_SIZE), None).unwrap();
    Rc::new(Frozen::new(agent))
}

/// An agent bootstrapping with the target network of a frozen teacher.
pub fn agent() -> Agent {
    Agent::build(
        config(TargetAction::Teacher, N_ACTIONS, BATCH_SIZE),
        Some(teacher(N_ACTIONS)),
    )
    .unwrap()
}

/// Snapshot of all variables of a var store.
pub fn snapshot(vs: &tch::nn::VarStore) -> Vec<(String, Tensor)> {
    let mut vars: Vec<_> = vs
        .variables()
        .into_iter()
        .map(|(k, v)| (k, v.detach().copy()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

pub fn same_values(a: &[(String, Tensor)], b: &[(String, Tensor)]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|((k1, v1), (k2, v2))| k1 == k2 && v1.equal(v2))
}

#[derive(Clone)]
pub struct FixedBufferConfig {
    pub batch_size: usize,
    pub prioritized: bool,
    pub all_done: bool,
    pub reward: Option<Vec<f32>>,
}

impl Default for FixedBufferConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            prioritized: false,
            all_done: false,
            reward: None,
        }
    }
}

/// Returns the same batch on every call and keeps the priority updates.
pub struct FixedBuffer {
    config: FixedBufferConfig,
    pub priorities: Vec<(Vec<usize>, Vec<f32>)>,
}

impl FixedBuffer {
    fn make_batch(&self) -> TensorBatch {
        let b = self.config.batch_size as i64;
        let obs = Tensor::arange(b * OBS_DIM, (Kind::Float, Device::Cpu)).view([b, OBS_DIM])
            / (b * OBS_DIM) as f64;
        let next_obs = obs.flip(&[0]);
        let act = Tensor::arange(b, (Kind::Int64, Device::Cpu)).remainder(N_ACTIONS).view([b, 1]);
        let reward = match &self.config.reward {
            Some(r) => r.clone(),
            None => (0..b).map(|i| 0.5 * i as f32 - 1.0).collect(),
        };
        let is_done = vec![if self.config.all_done { 1 } else { 0 }; b as usize];
        let (ix_sample, weight) = if self.config.prioritized {
            (
                Some((0..b as usize).collect()),
                Some((0..b).map(|i| 0.5 + 0.1 * i as f32).collect()),
            )
        } else {
            (None, None)
        };

        TensorBatch {
            obs,
            act,
            next_obs,
            reward,
            is_done,
            ix_sample,
            weight,
        }
    }
}

impl ReplayBufferBase for FixedBuffer {
    type Config = FixedBufferConfig;
    type Batch = TensorBatch;

    fn build(config: &Self::Config) -> Self {
        Self {
            config: config.clone(),
            priorities: vec![],
        }
    }

    fn batch(&mut self, size: usize) -> Result<TensorBatch> {
        ensure!(
            size == self.config.batch_size,
            "Fixed buffer holds {} transitions, {} requested",
            self.config.batch_size,
            size
        );
        Ok(self.make_batch())
    }

    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_err: &Option<Vec<f32>>) {
        if let (Some(ixs), Some(td_err)) = (ixs, td_err) {
            self.priorities.push((ixs.clone(), td_err.clone()));
        }
    }
}
