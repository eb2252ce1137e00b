//! Fixed-step integrators over whole state vectors
//!
//! Every integrator advances `x' = f(x, t)` for the concatenated
//! position/velocity state. The derivative callback is invoked once per
//! stage, so a constrained session re-solves for its Lagrange multipliers at
//! every stage.

use crate::physics::math::{Scalar, VecN};

pub mod explicit_euler;
pub mod heun;
pub mod registry;
pub mod runge_kutta;

pub use explicit_euler::ExplicitEuler;
pub use heun::Heun;
pub use registry::IntegratorRegistry;
pub use runge_kutta::{RungeKuttaFourthOrder, RungeKuttaSecondOrderMidpoint, ode};

/// State derivative `f(x, t)`
pub type Derivative<'a> = dyn FnMut(&VecN, Scalar) -> VecN + 'a;

/// Base trait for all integrators
pub trait Integrator: Send + Sync {
    fn clone_box(&self) -> Box<dyn Integrator>;

    /// Advance `state` from `time` by `h`, returning the new state
    fn step(&self, state: &VecN, time: Scalar, h: Scalar, derivative: &mut Derivative) -> VecN;

    /// Global order of accuracy
    fn convergence_order(&self) -> usize;

    /// Number of derivative evaluations per step
    fn stages(&self) -> usize;

    /// Canonical name used in configuration
    fn name(&self) -> &'static str;

    fn aliases(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

impl Clone for Box<dyn Integrator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// `x + k * scale`
pub(crate) fn offset(x: &VecN, k: &VecN, scale: Scalar) -> VecN {
    let mut out = x.clone();
    out.add_scaled(k, scale);
    out
}
