//! Matrix-free conjugate gradient

use crate::physics::math::{Scalar, VecN};
use serde::{Deserialize, Serialize};

/// Default stopping threshold on the squared residual
pub const DEFAULT_TOLERANCE: Scalar = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Stop once `r·r` falls below this value
    pub tolerance: Scalar,
    /// Optional iteration cap; `None` iterates until convergence
    pub max_iterations: Option<usize>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: VecN,
    pub iterations: usize,
    pub converged: bool,
}

/// Solve `A x = b` for symmetric positive-semidefinite `A`
///
/// `apply(x, out)` must write `A x` into `out`. Starts from `x = b` and runs
/// until the squared residual drops below [`DEFAULT_TOLERANCE`], or stops
/// early when the search direction's curvature `dᵀA d` is zero or not
/// finite, returning the current iterate.
pub fn solve(b: &[Scalar], apply: impl FnMut(&[Scalar], &mut [Scalar])) -> VecN {
    solve_with(b, apply, &SolverSettings::default()).x
}

pub fn solve_with(
    b: &[Scalar],
    mut apply: impl FnMut(&[Scalar], &mut [Scalar]),
    settings: &SolverSettings,
) -> Solution {
    let mut x = VecN::from(b);
    let mut product = VecN::zeros(b.len());

    apply(&x[..], &mut product[..]);
    let mut residual = VecN::from(b) - &product;
    let mut direction = residual.clone();
    let mut residual_squared = residual.dot(&residual);
    let mut iterations = 0;

    while residual_squared >= settings.tolerance {
        if settings
            .max_iterations
            .is_some_and(|limit| iterations >= limit)
        {
            break;
        }

        apply(&direction[..], &mut product[..]);
        let curvature = direction.dot(&product);
        if curvature == 0.0 || !curvature.is_finite() {
            break;
        }

        let alpha = residual_squared / curvature;
        x.add_scaled(&direction, alpha);
        residual.add_scaled(&product, -alpha);

        let next_residual_squared = residual.dot(&residual);
        let beta = next_residual_squared / residual_squared;
        direction *= beta;
        direction += &residual;
        residual_squared = next_residual_squared;
        iterations += 1;
    }

    Solution {
        x,
        iterations,
        converged: residual_squared < settings.tolerance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symmetric_2x2(x: &[Scalar], out: &mut [Scalar]) {
        // [[1, 1], [1, 0]]
        out[0] = x[0] + x[1];
        out[1] = x[0];
    }

    fn assert_close(actual: &VecN, expected: &[Scalar]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "expected {expected:?}, got {actual:?}");
        }
    }

    #[test]
    fn test_solves_small_system() {
        assert_close(&solve(&[2.0, 1.0], symmetric_2x2), &[1.0, 1.0]);
        assert_close(&solve(&[5.0, 3.0], symmetric_2x2), &[3.0, 2.0]);
    }

    #[test]
    fn test_exact_initial_guess_needs_no_iterations() {
        // x0 = b is already the solution of the identity system
        let solution = solve_with(
            &[4.0, -2.0, 7.0],
            |x, out| out.copy_from_slice(x),
            &SolverSettings::default(),
        );
        assert_eq!(solution.iterations, 0);
        assert!(solution.converged);
        assert_eq!(solution.x, VecN::from([4.0, -2.0, 7.0]));
    }

    #[test]
    fn test_empty_system() {
        let solution = solve_with(&[], |_, _| {}, &SolverSettings::default());
        assert!(solution.x.is_empty());
        assert!(solution.converged);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let settings = SolverSettings {
            tolerance: 1e-20,
            max_iterations: Some(1),
        };
        let solution = solve_with(&[5.0, 3.0], symmetric_2x2, &settings);
        assert_eq!(solution.iterations, 1);
        assert!(!solution.converged);
    }

    #[test]
    fn test_zero_curvature_stops_early() {
        // The zero operator gives dᵀA d = 0 on the first direction
        let solution = solve_with(&[1.0, 2.0], |_, out| out.fill(0.0), &SolverSettings::default());
        assert_eq!(solution.iterations, 0);
        assert!(!solution.converged);
        assert_eq!(solution.x, VecN::from([1.0, 2.0]));
    }

    #[test]
    fn test_diagonal_system_converges() {
        let diagonal = [1.0, 4.0, 9.0, 16.0];
        let b = [1.0, 2.0, 3.0, 4.0];
        let solution = solve_with(
            &b,
            |x, out| {
                for ((out, x), d) in out.iter_mut().zip(x).zip(&diagonal) {
                    *out = d * x;
                }
            },
            &SolverSettings {
                tolerance: 1e-20,
                max_iterations: None,
            },
        );
        assert!(solution.converged);
        assert!(solution.iterations <= 6);
        assert_close(&solution.x, &[1.0, 0.5, 1.0 / 3.0, 0.25]);
    }
}
