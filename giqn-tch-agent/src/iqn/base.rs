//! IQN agent with an adversarial critic.
use super::{
    select_action_quantiles, Discriminator, Freeze, Frozen, GanIqnConfig, IqnModel, IqnSample,
    QuantileShuffler, TargetAction,
};
use crate::{
    error::IqnError,
    model::{ModelBase, SubModel},
    util::{hard_update, is_finite, quantile_huber_loss, OutDim},
};
use anyhow::{ensure, Context, Result};
use giqn_core::{
    record::{Record, RecordValue},
    Agent, ReplayBufferBase, TransitionBatch,
};
use log::{debug, info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, marker::PhantomData, path::Path, rc::Rc};
use tch::{no_grad, Device, Kind, Tensor};

/// A batch of transitions on the device of the agent.
pub struct IqnBatch {
    /// Observations, `[batch_size, ...]`.
    pub obs: Tensor,

    /// Actions, `[batch_size, 1]`.
    pub act: Tensor,

    /// Next observations, `[batch_size, ...]`.
    pub next_obs: Tensor,

    /// Rewards, `[batch_size, 1]`.
    pub reward: Tensor,

    /// Termination flags as `0.0` or `1.0`, `[batch_size, 1]`.
    pub is_done: Tensor,

    /// Importance-sampling weights, `[batch_size]`.
    pub weight: Option<Tensor>,
}

impl IqnBatch {
    /// Creates a batch, moving tensors to `device`.
    pub fn new(
        obs: Tensor,
        act: Tensor,
        next_obs: Tensor,
        reward: &[f32],
        is_done: &[i8],
        weight: Option<&[f32]>,
        device: Device,
    ) -> Self {
        Self {
            obs: obs.to(device),
            act: act.to_kind(Kind::Int64).to(device),
            next_obs: next_obs.to(device),
            reward: Tensor::from_slice(reward).to(device).unsqueeze(-1),
            is_done: Tensor::from_slice(is_done)
                .to_kind(Kind::Float)
                .to(device)
                .unsqueeze(-1),
            weight: weight.map(|w| Tensor::from_slice(w).to(device)),
        }
    }

    /// Batch size.
    pub fn len(&self) -> i64 {
        self.act.size()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Losses of a training step.
pub struct IqnLosses {
    /// Quantile-Huber loss, connected to the graph of the online network.
    pub quantile: Tensor,

    /// Critic loss before the critic step.
    pub critic: f32,

    /// Current quantile samples in the order of the given fractions, `[batch_size, n, 1]`.
    pub current: Tensor,

    /// TD errors of paired samples, `[batch_size, n, 1]`.
    pub td_errors: Tensor,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// IQN agent whose quantile samples are also scored by an adversarial critic.
///
/// The agent owns an online network, a target network and a critic.
/// The optional teacher is another [`GanIqn`] frozen for the lifetime of
/// this agent. With [`TargetAction::Teacher`], the teacher's target network
/// selects the greedy next actions (cross-agent bootstrapping) while this
/// agent's target network evaluates them.
///
/// # Training step
///
/// ```mermaid
/// graph TD
///     A[Replay buffer] -->|batch| B[Online network]
///     A -->|next obs| C[Action selector]
///     C -->|next actions| D[Target network]
///     B -->|current quantiles| E[Shuffler]
///     D -->|target quantiles| E
///     E --> F[Critic step]
///     E --> G[Quantile-Huber loss]
///     G --> H[Online network step]
/// ```
///
/// 1. Fractions `taus` (`N`) and `tau_dashes` (`N'`, `N' = N`) are sampled.
/// 2. Current quantiles are evaluated at the actions in the batch.
/// 3. Targets `r + (1 - done) * gamma^n * z'(s', a')` are computed without gradients.
/// 4. The fraction axes are permuted, see [`QuantileShuffle`](super::QuantileShuffle).
/// 5. The critic takes one step on `mean(D(current)) - mean(D(target))`
///    and is frozen again.
/// 6. The online network takes one step on the quantile-Huber loss of the
///    elementwise TD errors.
pub struct GanIqn<F, M, S, R>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    S: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
{
    pub(in crate::iqn) batch_size: usize,
    pub(in crate::iqn) discount_factor: f64,
    pub(in crate::iqn) multi_step: usize,
    pub(in crate::iqn) kappa: f64,
    pub(in crate::iqn) sample_percents_pred: IqnSample,
    pub(in crate::iqn) sample_percents_tgt: IqnSample,
    pub(in crate::iqn) sample_percents_act: IqnSample,
    pub(in crate::iqn) target_action: TargetAction,
    pub(in crate::iqn) shuffler: QuantileShuffler,
    pub(in crate::iqn) target_update_interval: Option<usize>,
    pub(in crate::iqn) log_interval: usize,
    pub(in crate::iqn) grad_clip: Option<f64>,
    pub(in crate::iqn) check_finite: bool,
    pub(in crate::iqn) train: bool,
    pub(in crate::iqn) device: Device,
    pub(in crate::iqn) iqn: IqnModel<F, M>,
    pub(in crate::iqn) iqn_tgt: IqnModel<F, M>,
    pub(in crate::iqn) critic: Discriminator<S>,
    pub(in crate::iqn) teacher: Option<Rc<Frozen<GanIqn<F, M, S, R>>>>,
    pub(in crate::iqn) n_opts: usize,
    pub(in crate::iqn) phantom: PhantomData<R>,
}

impl<F, M, S, R> GanIqn<F, M, S, R>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    S: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    F::Config: DeserializeOwned + Serialize + Clone,
    M::Config: DeserializeOwned + Serialize + Clone + OutDim,
    S::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`GanIqn`] agent.
    ///
    /// The teacher is checked here: a missing teacher with
    /// [`TargetAction::Teacher`] or a teacher with another number of actions
    /// is an error.
    pub fn build(
        config: GanIqnConfig<F, M, S>,
        teacher: Option<Rc<Frozen<Self>>>,
    ) -> Result<Self> {
        let device: Device = config
            .device
            .context("No device is given for IQN agent")?
            .into();
        if let Some(seed) = config.seed {
            tch::manual_seed(seed);
        }

        let n = config.sample_percents_pred.n_percent_points();
        let n_dash = config.sample_percents_tgt.n_percent_points();
        if n < 1 || n != n_dash {
            return Err(IqnError::InvalidFractionCount { n, n_dash }.into());
        }
        ensure!(
            config.sample_percents_act.n_percent_points() >= 1,
            "The number of fractions for greedy actions must be positive"
        );
        ensure!(
            config.target_update_interval != Some(0),
            "The target update interval must be positive"
        );

        let n_actions = config
            .model_config
            .m_config
            .as_ref()
            .context("m_config is not set.")?
            .get_out_dim();

        match (&teacher, config.target_action) {
            (None, TargetAction::Teacher) => return Err(IqnError::MissingTeacher.into()),
            (Some(t), _) if t.n_actions() != n_actions => {
                return Err(IqnError::TeacherMismatch {
                    teacher: t.n_actions(),
                    agent: n_actions,
                }
                .into())
            }
            _ => {}
        }

        let iqn = IqnModel::build(config.model_config, n_actions, device)?;
        let mut iqn_tgt = iqn.clone();
        iqn_tgt.freeze();

        let critic_config = config
            .critic_config
            .context("critic_config is not set.")?;
        let critic = Discriminator::build(critic_config, device)?
            .update_options(config.grad_clip, config.check_finite);
        ensure!(
            critic.n_actions() == n_actions,
            "The critic takes {} actions, the agent has {}",
            critic.n_actions(),
            n_actions
        );

        Ok(Self {
            batch_size: config.batch_size,
            discount_factor: config.discount_factor,
            multi_step: config.multi_step,
            kappa: config.kappa,
            sample_percents_pred: config.sample_percents_pred,
            sample_percents_tgt: config.sample_percents_tgt,
            sample_percents_act: config.sample_percents_act,
            target_action: config.target_action,
            shuffler: QuantileShuffler::new(config.quantile_shuffle, config.shuffle_seed),
            target_update_interval: config.target_update_interval,
            log_interval: config.log_interval,
            grad_clip: config.grad_clip,
            check_finite: config.check_finite,
            train: config.train,
            device,
            iqn,
            iqn_tgt,
            critic,
            teacher,
            n_opts: 0,
            phantom: PhantomData,
        })
    }
}

impl<F, M, S, R> GanIqn<F, M, S, R>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    S: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
{
    /// Number of actions.
    pub fn n_actions(&self) -> i64 {
        self.iqn.out_dim()
    }

    /// Device of the networks.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Online network.
    pub fn online(&self) -> &IqnModel<F, M> {
        &self.iqn
    }

    /// Target network.
    pub fn target(&self) -> &IqnModel<F, M> {
        &self.iqn_tgt
    }

    /// Adversarial critic.
    pub fn critic(&self) -> &Discriminator<S> {
        &self.critic
    }

    /// Frozen teacher, if given.
    pub fn teacher(&self) -> Option<&Frozen<Self>> {
        self.teacher.as_deref()
    }

    /// Number of optimization steps done so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Copies the parameters of the online network to the target network.
    pub fn update_target(&mut self) -> Result<()> {
        hard_update(&mut self.iqn_tgt, &self.iqn)?;
        info!("Update target network at {} optimization steps", self.n_opts);
        Ok(())
    }

    /// Greedy actions `[batch_size, 1]` of the online network.
    pub fn greedy_action(&self, obs: &Tensor) -> Tensor {
        no_grad(|| {
            let embedding = self.iqn.embed(&obs.to(self.device));
            self.iqn.greedy_action(&embedding, &self.sample_percents_act)
        })
    }

    /// Greedy next actions `[batch_size, 1]` for bootstrapped targets.
    ///
    /// `tgt_embedding` is the embedding of `next_obs` by the target network.
    fn next_actions(&self, next_obs: &Tensor, tgt_embedding: &Tensor) -> Tensor {
        let model = match (self.target_action, &self.teacher) {
            (TargetAction::Teacher, Some(teacher)) => &teacher.iqn_tgt,
            (TargetAction::Online, _) => &self.iqn,
            // Building with TargetAction::Teacher requires a teacher.
            (_, _) => {
                return self
                    .iqn_tgt
                    .greedy_action(tgt_embedding, &self.sample_percents_act)
            }
        };
        let embedding = model.embed(next_obs);
        model.greedy_action(&embedding, &self.sample_percents_act)
    }

    /// Current quantile samples `[batch_size, n, 1]` at the actions in `batch`.
    pub fn current_quantiles(&self, batch: &IqnBatch, taus: &Tensor) -> Tensor {
        let embedding = self.iqn.embed(&batch.obs);
        select_action_quantiles(&self.iqn.quantiles(taus, &embedding), &batch.act)
    }

    /// Bootstrapped target samples `[batch_size, n', 1]`, computed without gradients.
    pub fn target_quantiles(&self, batch: &IqnBatch, tau_dashes: &Tensor) -> Tensor {
        no_grad(|| {
            let embedding = self.iqn_tgt.embed(&batch.next_obs);
            let next_act = self.next_actions(&batch.next_obs, &embedding);
            let next_q =
                select_action_quantiles(&self.iqn_tgt.quantiles(tau_dashes, &embedding), &next_act);
            let gamma_n = self.discount_factor.powi(self.multi_step as i32);
            let not_done = 1f64 - batch.is_done.unsqueeze(-1);
            batch.reward.unsqueeze(-1) + not_done * gamma_n * next_q
        })
    }

    /// Computes the losses of a training step and takes the critic step.
    ///
    /// `taus` and `tau_dashes` have the shape `[batch_size, n]`. The online
    /// network is not updated here.
    pub fn calculate_loss(
        &mut self,
        batch: &IqnBatch,
        taus: &Tensor,
        tau_dashes: &Tensor,
    ) -> Result<IqnLosses> {
        let batch_size = batch.len();
        let n = taus.size()[1];
        assert_eq!(
            taus.size().as_slice(),
            &[batch_size, n],
            "Fractions must have the shape [batch_size, n]"
        );
        assert_eq!(
            tau_dashes.size().as_slice(),
            &[batch_size, n],
            "Fractions of next states must have the shape of the fractions of current states"
        );
        assert_eq!(
            batch.reward.size().as_slice(),
            &[batch_size, 1],
            "Rewards must have the shape [batch_size, 1]"
        );
        assert_eq!(
            batch.is_done.size().as_slice(),
            &[batch_size, 1],
            "Termination flags must have the shape [batch_size, 1]"
        );

        let current = self.current_quantiles(batch, taus);
        let target = self.target_quantiles(batch, tau_dashes);
        debug_assert_eq!(current.size().as_slice(), &[batch_size, n, 1]);
        debug_assert_eq!(target.size().as_slice(), &[batch_size, n, 1]);

        let (current_s, taus_s, target_s) = self.shuffler.shuffle(&current, taus, &target);

        let loss_critic = self
            .critic
            .update(&current_s, &target_s, &batch.obs, &batch.act)?;
        debug_assert!(self.critic.is_frozen());

        let td_errors = target_s - &current_s;
        let loss = quantile_huber_loss(&td_errors, &taus_s, batch.weight.as_ref(), self.kappa);

        if self.check_finite && !is_finite(&loss) {
            return Err(IqnError::NonFiniteLoss {
                name: "loss_quantile".to_string(),
                value: loss.double_value(&[]) as f32,
            }
            .into());
        }

        Ok(IqnLosses {
            quantile: loss,
            critic: loss_critic,
            current: current.detach(),
            td_errors: td_errors.detach(),
        })
    }

    /// Compares the online network with the teacher's online network.
    fn teacher_record(
        &self,
        batch: &IqnBatch,
        taus: &Tensor,
        current: &Tensor,
    ) -> Result<Record> {
        let teacher = match &self.teacher {
            Some(teacher) => teacher,
            None => return Ok(Record::empty()),
        };
        let fixed = no_grad(|| teacher.current_quantiles(batch, taus));
        let q_online_mean = current.mean(Kind::Float).double_value(&[]) as f32;
        let q_teacher_mean = fixed.mean(Kind::Float).double_value(&[]) as f32;
        debug!(
            "Online Q: {}, teacher Q: {} at {} optimization steps",
            q_online_mean, q_teacher_mean, self.n_opts
        );

        let first = |t: &Tensor| -> Result<Vec<f32>> {
            Ok(Vec::<f32>::try_from(&t.get(0).view([-1]).to(Device::Cpu))?)
        };
        Ok(Record::from_slice(&[
            ("q_online_mean", RecordValue::Scalar(q_online_mean)),
            ("q_teacher_mean", RecordValue::Scalar(q_teacher_mean)),
            ("q_online_dist", RecordValue::Array1(first(current)?)),
            ("q_teacher_dist", RecordValue::Array1(first(&fixed)?)),
        ]))
    }
}

impl<F, M, S, R> GanIqn<F, M, S, R>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    S: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        trace!("GanIqn::opt_()");
        let batch = buffer.batch(self.batch_size)?;
        let (obs, act, next_obs, reward, is_done, ixs, weight) = batch.unpack();
        let batch = IqnBatch::new(
            obs.into(),
            act.into(),
            next_obs.into(),
            &reward,
            &is_done,
            weight.as_deref(),
            self.device,
        );

        let batch_size = batch.len();
        let taus = self.sample_percents_pred.sample(batch_size, self.device);
        let tau_dashes = self.sample_percents_tgt.sample(batch_size, self.device);

        let losses = self.calculate_loss(&batch, &taus, &tau_dashes)?;
        self.iqn.backward_step_clip(&losses.quantile, self.grad_clip);
        trace!("online network step");

        if ixs.is_some() {
            let td = losses
                .td_errors
                .abs()
                .sum_dim_intlist(Some([1i64].as_slice()), false, Kind::Float)
                .mean_dim(Some([1i64].as_slice()), false, Kind::Float)
                .to(Device::Cpu);
            let td = Vec::<f32>::try_from(&td)?;
            buffer.update_priority(&ixs, &Some(td));
        }

        self.n_opts += 1;
        if let Some(interval) = self.target_update_interval {
            if self.n_opts % interval == 0 {
                self.update_target()?;
            }
        }

        let loss_quantile = losses.quantile.double_value(&[]) as f32;
        let mean_q = losses.current.mean(Kind::Float).double_value(&[]) as f32;
        let mut record = Record::from_slice(&[
            ("loss_quantile", RecordValue::Scalar(loss_quantile)),
            ("loss_critic", RecordValue::Scalar(losses.critic)),
            ("mean_q", RecordValue::Scalar(mean_q)),
            ("opt_steps", RecordValue::Scalar(self.n_opts as f32)),
        ]);
        if self.log_interval > 0 && self.n_opts % self.log_interval == 0 {
            record.merge_inplace(self.teacher_record(&batch, &taus, &losses.current)?);
        }

        Ok(record)
    }
}

impl<F, M, S, R> Agent<R> for GanIqn<F, M, S, R>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    S: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    /// Performs an optimization step.
    ///
    /// The returned record includes:
    /// * `loss_quantile`, `loss_critic`, `mean_q`, `opt_steps`
    /// * `q_online_mean`, `q_teacher_mean`, `q_online_dist`, `q_teacher_dist`
    ///   every `log_interval` steps when a teacher is given.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        self.opt_(buffer)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.iqn.save(path.join("iqn.pt"))?;
        self.iqn_tgt.save(path.join("iqn_tgt.pt"))?;
        self.critic.save(path.join("discriminator.pt"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.iqn.load(path.join("iqn.pt"))?;
        self.iqn_tgt.load(path.join("iqn_tgt.pt"))?;
        self.critic.load(path.join("discriminator.pt"))?;
        Ok(())
    }
}

impl<F, M, S, R> Freeze for GanIqn<F, M, S, R>
where
    F: SubModel<Input = Tensor, Output = Tensor>,
    M: SubModel<Input = Tensor, Output = Tensor>,
    S: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
{
    fn freeze(&mut self) {
        self.iqn.freeze();
        self.iqn_tgt.freeze();
        self.critic.freeze();
        self.train = false;
    }

    fn is_frozen(&self) -> bool {
        self.iqn.is_frozen() && self.iqn_tgt.is_frozen() && self.critic.is_frozen()
    }
}
