//! Read-only agents.
use std::ops::Deref;

/// Agents whose parameters can be excluded from gradient tracking.
pub trait Freeze {
    /// Disables gradient tracking of every parameter set.
    fn freeze(&mut self);

    /// Returns `true` if no parameter tracks gradients.
    fn is_frozen(&self) -> bool;
}

/// An agent frozen at construction.
///
/// Only shared references to the inner agent are handed out, so its
/// parameters cannot be trained or unfrozen through this wrapper.
pub struct Frozen<A> {
    inner: A,
}

impl<A: Freeze> Frozen<A> {
    /// Freezes `agent` and wraps it.
    pub fn new(mut agent: A) -> Self {
        agent.freeze();
        Self { inner: agent }
    }
}

impl<A> Deref for Frozen<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.inner
    }
}
