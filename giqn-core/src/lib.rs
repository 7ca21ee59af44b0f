#![warn(missing_docs)]
//! Core vocabulary of the adversarial IQN agent.
//!
//! This crate does not depend on any tensor backend. It defines how an agent
//! is driven ([`Agent`]), where sampled transitions come from
//! ([`ReplayBufferBase`], [`TransitionBatch`]) and how training telemetry
//! leaves the agent ([`record`]).
pub mod error;
pub mod record;

mod base;
pub use base::{Agent, ReplayBufferBase, TransitionBatch};
