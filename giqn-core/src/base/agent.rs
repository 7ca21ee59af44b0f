//! Agent.
use super::ReplayBufferBase;
use crate::record::Record;
use anyhow::Result;
use std::path::Path;

/// Represents a trainable agent.
///
/// The driver owns the cadence: it decides when [`Agent::opt_with_record`]
/// is called and where the returned [`Record`] is written.
pub trait Agent<R: ReplayBufferBase> {
    /// Set the agent to training mode.
    fn train(&mut self);

    /// Set the agent to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Performs an optimization step, discarding the telemetry.
    fn opt(&mut self, buffer: &mut R) -> Result<()> {
        self.opt_with_record(buffer).map(|_| ())
    }

    /// Performs an optimization step and returns telemetry of the step.
    ///
    /// `buffer` is a replay buffer from which transitions will be taken
    /// for updating model parameters. Any failure inside the step is fatal
    /// for the step and is returned to the caller as is.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record>;

    /// Save the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Load the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
