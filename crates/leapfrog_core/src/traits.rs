use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Scalar type an ODE of the background can be integrated in.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order system `dy/dt = f(t, y)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Number of state variables.
    fn dimension(&self) -> usize;

    /// Writes `f(t, y)` into `out`.
    fn apply(&self, t: T, y: &[T], out: &mut [T]);
}

/// A fixed-step integrator for a [`DynamicalSystem`].
pub trait Steppable<T: Scalar> {
    /// Advances `state` from `*t` to `*t + dt`, updating `t`.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
