//! Heun's method (Improved Euler) integration
//!
//! A classical second-order predictor-corrector method that achieves improved
//! accuracy over Euler through slope averaging.

use super::{Derivative, Integrator, offset};
use crate::physics::math::{Scalar, VecN};

/// Heun's method (Improved Euler method)
///
/// # Algorithm
///
/// ```text
/// Predictor:
///   k1 = f(x, t)
///   x_pred = x + h * k1
///
/// Corrector:
///   k2 = f(x_pred, t + h)
///   x(t+h) = x + h/2 * (k1 + k2)
/// ```
///
/// # Properties
///
/// - **Order of accuracy**: O(h²) global error
/// - **Derivative evaluations**: 2 per step
/// - **Symplectic**: No
#[derive(Debug, Clone, Copy, Default)]
pub struct Heun;

impl Integrator for Heun {
    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(*self)
    }

    fn step(&self, state: &VecN, time: Scalar, h: Scalar, derivative: &mut Derivative) -> VecN {
        let k1 = derivative(state, time);
        let predicted = offset(state, &k1, h);
        let k2 = derivative(&predicted, time + h);

        let mut next = offset(state, &k1, h * 0.5);
        next.add_scaled(&k2, h * 0.5);
        next
    }

    fn convergence_order(&self) -> usize {
        2
    }

    fn stages(&self) -> usize {
        2
    }

    fn name(&self) -> &'static str {
        "heun"
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["improved_euler"]
    }
}
