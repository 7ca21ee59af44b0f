//! Adversarial critic scoring quantile samples in their state-action context.
mod config;
use crate::{
    error::IqnError,
    mlp::Mlp,
    model::{ModelBase, SubModel},
    opt::Optimizer,
    util::is_finite,
};
use anyhow::{Context, Result};
pub use config::DiscriminatorConfig;
use log::{info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// Scores how plausible each quantile value is for its state and action.
///
/// Every quantile value is scored jointly with its originating state and
/// action. The quantile value, the one-hot action and the state embedding
/// go through separate heads; the concatenation is projected to a scalar.
///
/// Parameters are frozen except inside [`Discriminator::update`].
pub struct Discriminator<S>
where
    S: SubModel<Input = Tensor, Output = Tensor>,
{
    device: Device,
    var_store: nn::VarStore,
    n_actions: i64,
    state_encoder: S,
    state_head: Mlp,
    action_head: Mlp,
    quantile_head: Mlp,
    output: nn::Linear,
    opt: Optimizer,
    grad_clip: Option<f64>,
    check_finite: bool,
}

impl<S> Discriminator<S>
where
    S: SubModel<Input = Tensor, Output = Tensor>,
    S::Config: DeserializeOwned + Serialize,
{
    /// Constructs a frozen [`Discriminator`].
    pub fn build(config: DiscriminatorConfig<S::Config>, device: Device) -> Result<Self> {
        let n_actions = config.n_actions();
        let concat_dim = config.concat_dim();
        let state_config = config
            .state_config
            .context("state_config is not set.")?;
        let mut var_store = nn::VarStore::new(device);
        let p = &var_store.root();
        let state_encoder = S::build(&(p / "state_encoder"), state_config);
        let state_head = Mlp::build(&(p / "state_head"), config.state_head);
        let action_head = Mlp::build(&(p / "action_head"), config.action_head);
        let quantile_head = Mlp::build(&(p / "quantile_head"), config.quantile_head);
        let output = nn::linear(p / "output", concat_dim, 1, Default::default());
        let opt = config.opt_config.build(&var_store)?;
        var_store.freeze();

        Ok(Self {
            device,
            var_store,
            n_actions,
            state_encoder,
            state_head,
            action_head,
            quantile_head,
            output,
            opt,
            grad_clip: None,
            check_finite: true,
        })
    }
}

impl<S> Discriminator<S>
where
    S: SubModel<Input = Tensor, Output = Tensor>,
{
    /// Sets the global gradient-norm clip and the finiteness check of the critic loss.
    pub fn update_options(mut self, grad_clip: Option<f64>, check_finite: bool) -> Self {
        self.grad_clip = grad_clip;
        self.check_finite = check_finite;
        self
    }

    /// Number of actions.
    pub fn n_actions(&self) -> i64 {
        self.n_actions
    }

    /// Returns scores with the shape `[batch_size * n_percent_points, 1]`.
    ///
    /// * `quantiles` has the shape `[batch_size, n_percent_points, 1]`.
    /// * `states` is a batch of observations.
    /// * `act` has the shape `[batch_size, 1]`.
    ///
    /// Row `i * n_percent_points + j` is the score of the `j`-th quantile
    /// value of the `i`-th sample.
    pub fn score(&self, quantiles: &Tensor, states: &Tensor, act: &Tensor) -> Tensor {
        let size = quantiles.size();
        let (batch_size, n_percent_points) = (size[0], size[1]);
        assert_eq!(size[2], 1, "Quantile samples must have the shape [batch_size, n, 1]");
        assert_eq!(
            act.size().as_slice(),
            &[batch_size, 1],
            "Actions must have the shape [batch_size, 1]"
        );

        let q = quantiles.to(self.device).reshape(&[batch_size * n_percent_points, 1]);
        let q = self.quantile_head.forward(&q);

        let s = self.state_head.forward(&self.state_encoder.forward(states));
        debug_assert_eq!(s.size()[0], batch_size);
        let s = Self::repeat_rows(&s, n_percent_points);

        let a = act
            .to_kind(Kind::Int64)
            .to(self.device)
            .view([-1])
            .onehot(self.n_actions)
            .to_kind(Kind::Float)
            .to(self.device);
        let a = Self::repeat_rows(&self.action_head.forward(&a), n_percent_points);

        let concat = Tensor::cat(&[q, s, a], 1);
        self.output.forward(&concat)
    }

    // [batch_size, d] -> [batch_size * n, d], each row repeated n times in place.
    fn repeat_rows(x: &Tensor, n: i64) -> Tensor {
        let size = x.size();
        x.unsqueeze(1)
            .repeat(&[1, n, 1])
            .reshape(&[size[0] * n, size[1]])
    }

    /// Wasserstein-style critic loss, `mean(score(current)) - mean(score(target))`.
    pub fn critic_loss(current_scores: &Tensor, target_scores: &Tensor) -> Tensor {
        current_scores.mean(Kind::Float) - target_scores.mean(Kind::Float)
    }

    /// Takes one gradient step on the critic loss of the two populations.
    ///
    /// Both populations are scored with the same states and actions.
    /// `current` must not carry the graph of the value network; it is
    /// detached here. Parameters are unfrozen for the duration of this call
    /// only, including when an error is returned.
    pub fn update(
        &mut self,
        current: &Tensor,
        target: &Tensor,
        states: &Tensor,
        act: &Tensor,
    ) -> Result<f32> {
        self.var_store.unfreeze();
        let result = self.step(&current.detach(), &target.detach(), states, act);
        self.opt.zero_grad();
        self.var_store.freeze();
        result
    }

    fn step(
        &mut self,
        current: &Tensor,
        target: &Tensor,
        states: &Tensor,
        act: &Tensor,
    ) -> Result<f32> {
        let current_scores = self.score(current, states, act);
        let target_scores = self.score(target, states, act);
        let loss = Self::critic_loss(&current_scores, &target_scores);

        if self.check_finite && !is_finite(&loss) {
            return Err(IqnError::NonFiniteLoss {
                name: "loss_critic".to_string(),
                value: loss.double_value(&[]) as f32,
            }
            .into());
        }

        match self.grad_clip {
            Some(max_norm) => self.opt.backward_step_clip_norm(&loss, max_norm),
            None => self.opt.backward_step(&loss),
        }
        trace!("critic step");

        Ok(loss.double_value(&[]) as f32)
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

impl<S> ModelBase for Discriminator<S>
where
    S: SubModel<Input = Tensor, Output = Tensor>,
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
        info!("Save discriminator to {:?}", path.as_ref());
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load discriminator from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mlp::MlpConfig;

    const STATE_DIM: i64 = 5;
    const N_ACTIONS: i64 = 3;

    fn discriminator() -> Discriminator<Mlp> {
        let config = DiscriminatorConfig::new(
            MlpConfig::new(STATE_DIM, vec![8], 8, true),
            8,
            N_ACTIONS,
        )
        .state_head(MlpConfig::new(8, vec![16], 16, true))
        .opt_config(crate::opt::OptimizerConfig::Adam { lr: 1e-2 });
        Discriminator::build(config, Device::Cpu).unwrap()
    }

    #[test]
    fn test_score_shape() {
        let critic = discriminator();
        let q = Tensor::rand(&[2, 4, 1], tch::kind::FLOAT_CPU);
        let s = Tensor::rand(&[2, STATE_DIM], tch::kind::FLOAT_CPU);
        let a = Tensor::from_slice(&[0i64, 2]).view([2, 1]);
        assert_eq!(critic.score(&q, &s, &a).size(), vec![8, 1]);
    }

    #[test]
    fn test_score_is_deterministic() {
        let critic = discriminator();
        let q = Tensor::rand(&[3, 5, 1], tch::kind::FLOAT_CPU);
        let s = Tensor::rand(&[3, STATE_DIM], tch::kind::FLOAT_CPU);
        let a = Tensor::from_slice(&[1i64, 0, 2]).view([3, 1]);
        let s1 = critic.score(&q, &s, &a);
        let s2 = critic.score(&q, &s, &a);
        assert!(s1.equal(&s2));
    }

    #[test]
    fn test_rows_follow_quantile_order() {
        // Identical quantile values within a sample share a state-action context.
        let critic = discriminator();
        let q = Tensor::ones(&[2, 3, 1], tch::kind::FLOAT_CPU);
        let s = Tensor::rand(&[2, STATE_DIM], tch::kind::FLOAT_CPU);
        let a = Tensor::from_slice(&[0i64, 1]).view([2, 1]);
        let scores = critic.score(&q, &s, &a).view([2, 3]);
        let first = scores.select(1, 0).unsqueeze(1).expand(&[2, 3], false);
        assert!(scores.allclose(&first, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_update_changes_parameters_and_refreezes() {
        tch::manual_seed(42);
        let mut critic = discriminator();
        assert!(critic.is_frozen());
        let before: Vec<Tensor> = critic
            .get_var_store()
            .trainable_variables()
            .iter()
            .map(|t| t.detach().copy())
            .collect();

        let current = Tensor::rand(&[4, 6, 1], tch::kind::FLOAT_CPU);
        let target = Tensor::rand(&[4, 6, 1], tch::kind::FLOAT_CPU) + 1.0;
        let s = Tensor::rand(&[4, STATE_DIM], tch::kind::FLOAT_CPU);
        let a = Tensor::from_slice(&[0i64, 1, 2, 1]).view([4, 1]);
        let loss = critic.update(&current, &target, &s, &a).unwrap();
        assert!(loss.is_finite());
        assert!(critic.is_frozen());

        let after = critic.get_var_store().trainable_variables();
        let changed = before
            .iter()
            .zip(after.iter())
            .any(|(b, a)| !b.equal(a));
        assert!(changed);
    }

    #[test]
    fn test_update_leaves_no_gradients() {
        let mut critic = discriminator();
        let current = Tensor::rand(&[2, 4, 1], tch::kind::FLOAT_CPU);
        let target = Tensor::rand(&[2, 4, 1], tch::kind::FLOAT_CPU) - 1.0;
        let s = Tensor::rand(&[2, STATE_DIM], tch::kind::FLOAT_CPU);
        let a = Tensor::from_slice(&[2i64, 0]).view([2, 1]);
        critic.update(&current, &target, &s, &a).unwrap();

        for var in critic.get_var_store().trainable_variables() {
            let grad = var.grad();
            assert!(!grad.defined() || grad.abs().max().double_value(&[]) == 0.0);
        }
    }

    #[test]
    fn test_non_finite_loss_is_reported() {
        let mut critic = discriminator();
        let current = Tensor::full(&[1, 2, 1], f64::NAN, tch::kind::FLOAT_CPU);
        let target = Tensor::rand(&[1, 2, 1], tch::kind::FLOAT_CPU);
        let s = Tensor::rand(&[1, STATE_DIM], tch::kind::FLOAT_CPU);
        let a = Tensor::from_slice(&[0i64]).view([1, 1]);
        let err = critic.update(&current, &target, &s, &a).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IqnError>(),
            Some(IqnError::NonFiniteLoss { .. })
        ));
        assert!(critic.is_frozen());
    }
}
