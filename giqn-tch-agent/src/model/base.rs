//! Definition of interfaces of neural networks.
use anyhow::Result;
use std::path::Path;
use tch::{nn, Tensor};

/// Base interface of a network owning its parameters and optimizer.
pub trait ModelBase {
    /// Trains the network given a loss.
    fn backward_step(&mut self, loss: &Tensor);

    /// Returns `var_store` as mutable reference.
    fn get_var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Returns `var_store`.
    fn get_var_store(&self) -> &nn::VarStore;

    /// Save parameters of the neural network.
    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()>;

    /// Load parameters of the neural network.
    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()>;
}

/// Neural network module that is initialized under a given [`nn::Path`].
///
/// Modules composing a network share the [`nn::VarStore`] of the network,
/// each under its own sub-path. Cloning onto another path is used when a
/// target network is created from an online network.
pub trait SubModel {
    /// Configuration from which [`SubModel`] is constructed.
    type Config;

    /// Input of the [`SubModel`].
    type Input;

    /// Output of the [`SubModel`].
    type Output;

    /// Builds [`SubModel`] under `p` with [`SubModel::Config`].
    fn build(p: &nn::Path, config: Self::Config) -> Self;

    /// Creates a module with the same architecture under `p`.
    ///
    /// Parameter values are not copied.
    fn clone_with_path(&self, p: &nn::Path) -> Self;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Self::Output;
}
