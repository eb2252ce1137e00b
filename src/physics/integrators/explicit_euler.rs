//! Explicit Euler integration method (forward Euler)
//!
//! Provided mostly for comparison. Constrained systems drift quickly under it
//! and rely heavily on stabilization to stay near the constraint manifold.

use super::{Derivative, Integrator, offset};
use crate::physics::math::{Scalar, VecN};

/// Explicit Euler integrator
///
/// ```text
/// x(t+h) = x(t) + h * f(x(t), t)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitEuler;

impl Integrator for ExplicitEuler {
    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(*self)
    }

    fn step(&self, state: &VecN, time: Scalar, h: Scalar, derivative: &mut Derivative) -> VecN {
        let k1 = derivative(state, time);
        offset(state, &k1, h)
    }

    fn convergence_order(&self) -> usize {
        1
    }

    fn stages(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str {
        "explicit_euler"
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["forward_euler"]
    }
}
