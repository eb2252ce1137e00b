//! Runge-Kutta integration methods

use super::{Derivative, Integrator, offset};
use crate::physics::math::{Scalar, VecN};

/// Second-order Runge-Kutta method (Midpoint method)
///
/// Algorithm:
/// - k1 = f(x, t)
/// - k2 = f(x + k1*h/2, t + h/2)
/// - x_new = x + k2*h
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKuttaSecondOrderMidpoint;

impl Integrator for RungeKuttaSecondOrderMidpoint {
    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(*self)
    }

    fn step(&self, state: &VecN, time: Scalar, h: Scalar, derivative: &mut Derivative) -> VecN {
        let half = h * 0.5;
        let k1 = derivative(state, time);
        let k2 = derivative(&offset(state, &k1, half), time + half);
        offset(state, &k2, h)
    }

    fn convergence_order(&self) -> usize {
        2
    }

    fn stages(&self) -> usize {
        2
    }

    fn name(&self) -> &'static str {
        "rk2_midpoint"
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["rk2", "midpoint"]
    }
}

/// Fourth-order Runge-Kutta integrator (RK4)
///
/// The RK4 algorithm:
/// 1. k1 = f(x, t)
/// 2. k2 = f(x + k1*h/2, t + h/2)
/// 3. k3 = f(x + k2*h/2, t + h/2)
/// 4. k4 = f(x + k3*h, t + h)
/// 5. x(t+h) = x(t) + h/6 * (k1 + 2*k2 + 2*k3 + k4)
///
/// This is the session's default integrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKuttaFourthOrder;

impl Integrator for RungeKuttaFourthOrder {
    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(*self)
    }

    fn step(&self, state: &VecN, time: Scalar, h: Scalar, derivative: &mut Derivative) -> VecN {
        let half = h * 0.5;
        let k1 = derivative(state, time);
        let k2 = derivative(&offset(state, &k1, half), time + half);
        let k3 = derivative(&offset(state, &k2, half), time + half);
        let k4 = derivative(&offset(state, &k3, h), time + h);

        let mut increment = k1;
        increment.add_scaled(&k2, 2.0);
        increment.add_scaled(&k3, 2.0);
        increment += &k4;
        state + &(increment * h / 6.0)
    }

    fn convergence_order(&self) -> usize {
        4
    }

    fn stages(&self) -> usize {
        4
    }

    fn name(&self) -> &'static str {
        "runge_kutta_fourth_order"
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["rk4"]
    }
}

/// One classic RK4 step of `x' = f(x, t)` from `(x, t)` with step `h`
pub fn ode(x: &VecN, t: Scalar, h: Scalar, mut f: impl FnMut(&VecN, Scalar) -> VecN) -> VecN {
    RungeKuttaFourthOrder.step(x, t, h, &mut f)
}
