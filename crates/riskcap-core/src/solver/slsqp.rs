use serde::{Deserialize, Serialize};
use tracing::debug;

use super::problem::{constraint_violation, ConstrainedProblem};
use super::qp::{solve_qp, LinearConstraint, QpFailure};
use crate::error::RiskcapError;
use crate::linalg::{cholesky, identity, mat_vec_multiply, vec_dot, vec_norm};
use crate::RiskcapResult;

const MAX_LINE_SEARCH_STEPS: usize = 10;
const ARMIJO_FRACTION: f64 = 0.1;
const BFGS_DAMPING_THRESHOLD: f64 = 0.2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Iteration budget and stopping tolerance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SqpSettings {
    /// Maximum number of major (QP) iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Tolerance on predicted decrease, objective change and total
    /// constraint violation.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_iterations() -> u32 {
    100
}

fn default_tolerance() -> f64 {
    1e-9
}

impl Default for SqpSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqpStatus {
    Converged,
    IterationLimit,
    /// The linearised constraints admit no step from an infeasible iterate,
    /// even with a fresh Hessian.
    IncompatibleConstraints,
    /// The QP subproblem could not be solved with a fresh Hessian, for a
    /// reason other than inconsistent constraints at an infeasible iterate.
    SubproblemFailed,
    /// No acceptable step along the search direction, even after a
    /// Hessian reset.
    LineSearchFailed,
    /// Objective or gradient undefined at the starting or an accepted point.
    DegenerateObjective,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqpOutcome {
    /// Last accepted iterate; always inside the bounds.
    pub x: Vec<f64>,
    /// Objective at `x`, absent when it could not be evaluated.
    pub objective: Option<f64>,
    pub iterations: u32,
    pub status: SqpStatus,
    /// `sum |c_eq| + sum max(0, -c_in)` at `x`.
    pub constraint_violation: f64,
}

impl SqpOutcome {
    pub fn converged(&self) -> bool {
        self.status == SqpStatus::Converged
    }
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// Minimise `problem` from `x0` by sequential quadratic programming.
///
/// Each major iteration solves a QP built from a damped-BFGS Hessian
/// approximation and the linearised constraints and bounds, then runs a
/// backtracking line search on the L1 exact-penalty merit function.
/// Iterates are clamped into the bounds, so bounds are never violated.
///
/// Only a malformed starting point is an error; every other outcome,
/// including failure to converge, is reported through [`SqpStatus`].
pub fn minimize<P: ConstrainedProblem + ?Sized>(
    problem: &P,
    x0: &[f64],
    settings: &SqpSettings,
) -> RiskcapResult<SqpOutcome> {
    let n = problem.dimension();
    if x0.len() != n {
        return Err(RiskcapError::InvalidInput {
            field: "x0".into(),
            reason: format!("Expected {} starting values but got {}", n, x0.len()),
        });
    }
    let bounds = problem.bounds();
    if bounds.len() != n {
        return Err(RiskcapError::InvalidInput {
            field: "bounds".into(),
            reason: format!("Expected {} bounds but got {}", n, bounds.len()),
        });
    }
    if let Some(i) = bounds.iter().position(|(lo, hi)| lo > hi) {
        return Err(RiskcapError::InvalidInput {
            field: "bounds".into(),
            reason: format!("Lower bound exceeds upper bound for variable {}", i),
        });
    }

    let acc = settings.tolerance;
    let mut x = clamp_to_bounds(x0, &bounds);

    let finish = |x: Vec<f64>, objective: Option<f64>, iterations: u32, status: SqpStatus| {
        let violation = constraint_violation(problem, &x);
        debug!(?status, iterations, violation, "sqp finished");
        SqpOutcome {
            x,
            objective,
            iterations,
            status,
            constraint_violation: violation,
        }
    };

    let (mut f, mut g) = match problem
        .objective(&x)
        .and_then(|f| problem.gradient(&x).map(|g| (f, g)))
    {
        Ok(pair) => pair,
        Err(e) => {
            debug!(error = %e, "objective undefined at starting point");
            return Ok(finish(x, None, 0, SqpStatus::DegenerateObjective));
        }
    };

    let mut hessian = identity(n);
    let mut hessian_is_fresh = true;
    let mut penalties: Vec<f64> = Vec::new();
    let mut iteration: u32 = 0;

    while iteration < settings.max_iterations {
        iteration += 1;

        let c_eq = problem.equality_constraints(&x);
        let c_in = problem.inequality_constraints(&x);
        let jac_eq = problem.equality_jacobian(&x);
        let jac_in = problem.inequality_jacobian(&x);
        let n_nonlinear = c_eq.len() + c_in.len();
        if penalties.len() != n_nonlinear {
            penalties = vec![0.0; n_nonlinear];
        }

        let rows = build_qp_rows(&x, &bounds, &c_eq, &c_in, &jac_eq, &jac_in);

        let factor = match cholesky(&hessian) {
            Some(l) => l,
            None => {
                hessian = identity(n);
                hessian_is_fresh = true;
                identity(n)
            }
        };

        let qp = match solve_qp(&factor, &g, &rows) {
            Ok(qp) => qp,
            Err(failure) if !hessian_is_fresh => {
                debug!(
                    iteration,
                    ?failure,
                    "qp subproblem failed; resetting Hessian approximation"
                );
                hessian = identity(n);
                hessian_is_fresh = true;
                continue;
            }
            Err(failure) => {
                // Inconsistent rows only count against an infeasible iterate.
                let status = match failure {
                    QpFailure::Inconsistent if constraint_violation(problem, &x) >= acc => {
                        SqpStatus::IncompatibleConstraints
                    }
                    _ => SqpStatus::SubproblemFailed,
                };
                return Ok(finish(x, Some(f), iteration, status));
            }
        };
        let d = qp.step;
        let multipliers = &qp.multipliers[..n_nonlinear];

        let constraint_values: Vec<f64> = c_eq.iter().chain(c_in.iter()).copied().collect();
        let violations: Vec<f64> = c_eq
            .iter()
            .map(|c| c.abs())
            .chain(c_in.iter().map(|c| (-c).max(0.0)))
            .collect();
        let total_violation: f64 = violations.iter().sum();

        let predicted = vec_dot(&g, &d).abs()
            + multipliers
                .iter()
                .zip(constraint_values.iter())
                .map(|(l, c)| (l * c).abs())
                .sum::<f64>();
        if predicted < acc && total_violation < acc {
            return Ok(finish(x, Some(f), iteration, SqpStatus::Converged));
        }

        for (rho, lambda) in penalties.iter_mut().zip(multipliers.iter()) {
            *rho = lambda.abs().max(0.5 * (*rho + lambda.abs()));
        }

        let merit_at = |point: &[f64], value: f64| -> f64 {
            value + weighted_violation(problem, point, &penalties)
        };
        let merit_current = merit_at(&x, f);
        let directional = vec_dot(&g, &d)
            - penalties
                .iter()
                .zip(violations.iter())
                .map(|(rho, v)| rho * v)
                .sum::<f64>();

        let mut accepted: Option<(Vec<f64>, f64, f64)> = None;
        if directional < 0.0 {
            let mut alpha = 1.0_f64;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                let trial: Vec<f64> = x
                    .iter()
                    .zip(d.iter())
                    .zip(bounds.iter())
                    .map(|((xi, di), (lo, hi))| (xi + alpha * di).max(*lo).min(*hi))
                    .collect();
                let (trial_f, trial_merit) = match problem.objective(&trial) {
                    Ok(v) => (v, merit_at(&trial, v)),
                    Err(_) => (f64::NAN, f64::INFINITY),
                };
                if trial_merit - merit_current <= ARMIJO_FRACTION * alpha * directional {
                    accepted = Some((trial, trial_f, alpha));
                    break;
                }
                alpha = if trial_merit.is_finite() {
                    let curvature = trial_merit - merit_current - directional * alpha;
                    let interpolated = -directional * alpha * alpha / (2.0 * curvature);
                    (0.5 * alpha).min(interpolated).max(0.1 * alpha)
                } else {
                    0.1 * alpha
                };
            }
        }

        let Some((x_new, f_new, alpha)) = accepted else {
            if hessian_is_fresh {
                return Ok(finish(x, Some(f), iteration, SqpStatus::LineSearchFailed));
            }
            debug!(iteration, "line search failed; resetting Hessian approximation");
            hessian = identity(n);
            hessian_is_fresh = true;
            continue;
        };

        let g_new = match problem.gradient(&x_new) {
            Ok(g) => g,
            Err(_) => {
                return Ok(finish(
                    x_new,
                    Some(f_new),
                    iteration,
                    SqpStatus::DegenerateObjective,
                ));
            }
        };

        // Damped BFGS update on the Lagrangian gradient difference.
        let jac_eq_new = problem.equality_jacobian(&x_new);
        let jac_in_new = problem.inequality_jacobian(&x_new);
        let grad_lag_old = lagrangian_gradient(&g, &jac_eq, &jac_in, multipliers);
        let grad_lag_new = lagrangian_gradient(&g_new, &jac_eq_new, &jac_in_new, multipliers);
        let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = grad_lag_new
            .iter()
            .zip(grad_lag_old.iter())
            .map(|(a, b)| a - b)
            .collect();
        if update_bfgs(&mut hessian, &s, y) {
            hessian_is_fresh = false;
        }

        let f_old = f;
        x = x_new;
        f = f_new;
        g = g_new;

        let violation = constraint_violation(problem, &x);
        let step_norm = vec_norm(&s);
        debug!(
            iteration,
            objective = f,
            violation,
            step_norm,
            alpha,
            "sqp iteration"
        );

        if ((f - f_old).abs() < acc || step_norm < acc) && violation < acc {
            return Ok(finish(x, Some(f), iteration, SqpStatus::Converged));
        }
    }

    Ok(finish(x, Some(f), iteration, SqpStatus::IterationLimit))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clamp_to_bounds(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds.iter())
        .map(|(xi, (lo, hi))| xi.max(*lo).min(*hi))
        .collect()
}

/// Linearise constraints and bounds around `x` as rows on the step `d`:
/// `J_eq d = -c_eq`, `J_in d >= -c_in`, `lb - x <= d <= ub - x`.
/// Equality and inequality rows come first, in that order.
fn build_qp_rows(
    x: &[f64],
    bounds: &[(f64, f64)],
    c_eq: &[f64],
    c_in: &[f64],
    jac_eq: &[Vec<f64>],
    jac_in: &[Vec<f64>],
) -> Vec<LinearConstraint> {
    let n = x.len();
    let mut rows = Vec::with_capacity(c_eq.len() + c_in.len() + 2 * n);

    for (c, a) in c_eq.iter().zip(jac_eq.iter()) {
        rows.push(LinearConstraint::equality(a.clone(), -c));
    }
    for (c, a) in c_in.iter().zip(jac_in.iter()) {
        rows.push(LinearConstraint::inequality(a.clone(), -c));
    }
    for (i, (lo, hi)) in bounds.iter().enumerate() {
        if lo.is_finite() {
            let mut a = vec![0.0; n];
            a[i] = 1.0;
            rows.push(LinearConstraint::inequality(a, lo - x[i]));
        }
        if hi.is_finite() {
            let mut a = vec![0.0; n];
            a[i] = -1.0;
            rows.push(LinearConstraint::inequality(a, x[i] - hi));
        }
    }
    rows
}

fn weighted_violation<P: ConstrainedProblem + ?Sized>(
    problem: &P,
    x: &[f64],
    penalties: &[f64],
) -> f64 {
    let eq = problem.equality_constraints(x);
    let ineq = problem.inequality_constraints(x);
    eq.iter()
        .map(|c| c.abs())
        .chain(ineq.iter().map(|c| (-c).max(0.0)))
        .zip(penalties.iter())
        .map(|(v, rho)| rho * v)
        .sum()
}

/// `g - J' lambda` over the nonlinear constraints (bound multipliers drop
/// out of gradient differences because bound rows are constant).
fn lagrangian_gradient(
    g: &[f64],
    jac_eq: &[Vec<f64>],
    jac_in: &[Vec<f64>],
    multipliers: &[f64],
) -> Vec<f64> {
    let mut out = g.to_vec();
    for (row, lambda) in jac_eq.iter().chain(jac_in.iter()).zip(multipliers.iter()) {
        for (o, a) in out.iter_mut().zip(row.iter()) {
            *o -= lambda * a;
        }
    }
    out
}

/// Powell-damped BFGS update. Returns false when the step is too small to
/// carry curvature information and the matrix was left untouched.
fn update_bfgs(hessian: &mut [Vec<f64>], s: &[f64], mut y: Vec<f64>) -> bool {
    let bs = mat_vec_multiply(hessian, s);
    let s_bs = vec_dot(s, &bs);
    if s_bs <= f64::MIN_POSITIVE {
        return false;
    }
    let mut s_y = vec_dot(s, &y);
    if s_y < BFGS_DAMPING_THRESHOLD * s_bs {
        let theta = (1.0 - BFGS_DAMPING_THRESHOLD) * s_bs / (s_bs - s_y);
        for (yi, bi) in y.iter_mut().zip(bs.iter()) {
            *yi = theta * *yi + (1.0 - theta) * bi;
        }
        s_y = vec_dot(s, &y);
    }
    for (i, row) in hessian.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell += y[i] * y[j] / s_y - bs[i] * bs[j] / s_bs;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min (x0 - 1)^2 + (x1 - 2.5)^2 subject to three linear inequalities
    /// and x >= 0. Optimum at (1.4, 1.7).
    struct LinearlyConstrained;

    impl ConstrainedProblem for LinearlyConstrained {
        fn dimension(&self) -> usize {
            2
        }

        fn objective(&self, x: &[f64]) -> RiskcapResult<f64> {
            Ok((x[0] - 1.0).powi(2) + (x[1] - 2.5).powi(2))
        }

        fn gradient(&self, x: &[f64]) -> RiskcapResult<Vec<f64>> {
            Ok(vec![2.0 * (x[0] - 1.0), 2.0 * (x[1] - 2.5)])
        }

        fn inequality_constraints(&self, x: &[f64]) -> Vec<f64> {
            vec![
                x[0] - 2.0 * x[1] + 2.0,
                -x[0] - 2.0 * x[1] + 6.0,
                -x[0] + 2.0 * x[1] + 2.0,
            ]
        }

        fn inequality_jacobian(&self, _x: &[f64]) -> Vec<Vec<f64>> {
            vec![vec![1.0, -2.0], vec![-1.0, -2.0], vec![-1.0, 2.0]]
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, f64::INFINITY); 2]
        }
    }

    /// min x0^2 + x1^2 s.t. x0 + x1 = 1, using the default
    /// finite-difference gradient.
    struct EqualityOnly;

    impl ConstrainedProblem for EqualityOnly {
        fn dimension(&self) -> usize {
            2
        }

        fn objective(&self, x: &[f64]) -> RiskcapResult<f64> {
            Ok(x[0] * x[0] + x[1] * x[1])
        }

        fn equality_constraints(&self, x: &[f64]) -> Vec<f64> {
            vec![x[0] + x[1] - 1.0]
        }

        fn equality_jacobian(&self, _x: &[f64]) -> Vec<Vec<f64>> {
            vec![vec![1.0, 1.0]]
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(-10.0, 10.0); 2]
        }
    }

    struct Undefined;

    impl ConstrainedProblem for Undefined {
        fn dimension(&self) -> usize {
            1
        }

        fn objective(&self, _x: &[f64]) -> RiskcapResult<f64> {
            Err(RiskcapError::DivisionByZero {
                context: "test objective".into(),
            })
        }
    }

    #[test]
    fn test_linear_inequalities_reach_known_optimum() {
        let out = minimize(&LinearlyConstrained, &[2.0, 0.0], &SqpSettings::default()).unwrap();
        assert_eq!(out.status, SqpStatus::Converged);
        assert!((out.x[0] - 1.4).abs() < 1e-6, "x0 = {}", out.x[0]);
        assert!((out.x[1] - 1.7).abs() < 1e-6, "x1 = {}", out.x[1]);
        assert!(out.constraint_violation < 1e-9);
    }

    #[test]
    fn test_equality_with_numerical_gradient() {
        let out = minimize(&EqualityOnly, &[3.0, -1.0], &SqpSettings::default()).unwrap();
        assert!(out.converged());
        assert!((out.x[0] - 0.5).abs() < 1e-5);
        assert!((out.x[1] - 0.5).abs() < 1e-5);
        assert!((out.x[0] + out.x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_point_is_clamped_into_bounds() {
        let out = minimize(&EqualityOnly, &[50.0, -50.0], &SqpSettings::default()).unwrap();
        assert!(out.x.iter().all(|v| (-10.0..=10.0).contains(v)));
        assert!(out.converged());
    }

    #[test]
    fn test_undefined_objective_reported_as_status() {
        let out = minimize(&Undefined, &[0.0], &SqpSettings::default()).unwrap();
        assert_eq!(out.status, SqpStatus::DegenerateObjective);
        assert!(out.objective.is_none());
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn test_iteration_budget_respected() {
        let settings = SqpSettings {
            max_iterations: 1,
            tolerance: 1e-14,
        };
        let out = minimize(&LinearlyConstrained, &[2.0, 0.0], &settings).unwrap();
        assert!(out.iterations <= 1);
        assert_ne!(out.status, SqpStatus::DegenerateObjective);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        assert!(minimize(&EqualityOnly, &[1.0], &SqpSettings::default()).is_err());
    }

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let s: SqpSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.max_iterations, 100);
        assert_eq!(s.tolerance, 1e-9);
    }
}
