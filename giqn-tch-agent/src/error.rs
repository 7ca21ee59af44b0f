//! Errors in the library.
use thiserror::Error;

/// Errors raised by the IQN agent.
#[derive(Debug, Error)]
pub enum IqnError {
    /// Next actions are selected by a teacher that was not given.
    #[error("Target actions are selected by the teacher, but no teacher agent was given")]
    MissingTeacher,

    /// The teacher acts on a different action space.
    #[error("Teacher has {teacher} actions, the agent has {agent}")]
    TeacherMismatch { teacher: i64, agent: i64 },

    /// Fraction counts are not positive or differ between current and next states.
    #[error("Invalid numbers of fractions: {n} for current states, {n_dash} for next states")]
    InvalidFractionCount { n: i64, n_dash: i64 },

    /// A loss became NaN or infinite.
    #[error("Non-finite {name}: {value}")]
    NonFiniteLoss { name: String, value: f32 },
}
