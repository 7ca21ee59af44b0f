//! IQN agent with an adversarial critic.
mod base;
mod config;
mod discriminator;
mod frozen;
mod model;
mod sample;
mod shuffle;
pub use base::{GanIqn, IqnBatch, IqnLosses};
pub use config::{GanIqnConfig, TargetAction};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use frozen::{Freeze, Frozen};
pub use model::{select_action_quantiles, IqnModel, IqnModelConfig};
pub use sample::IqnSample;
pub use shuffle::{QuantileShuffle, QuantileShuffler};
