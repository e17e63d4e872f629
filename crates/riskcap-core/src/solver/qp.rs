//! Strictly convex QP subproblem
//!
//! ```text
//! min  ½ d'Bd + g'd   s.t.  a_k'd = b_k (equalities),  a_k'd >= b_k (inequalities)
//! ```
//!
//! with `B` symmetric positive definite, solved by the Goldfarb-Idnani dual
//! active-set method. Starting from the unconstrained minimiser, the most
//! violated row is added to the working set one at a time; a working row
//! whose multiplier would turn negative is dropped on the way. The iterate
//! stays dual feasible throughout, so a violated row that no working row can
//! make room for proves the constraints inconsistent.
//!
//! Rows that are linearly dependent on the working set never enter it: a
//! satisfied one is redundant and skipped, a violated one forces a drop.

use crate::linalg::{cholesky_solve, solve_linear_system, vec_dot};

/// Relative slack below which a row counts as satisfied.
const FEASIBILITY_TOLERANCE: f64 = 1e-12;
/// A row is dependent on the working set when its component outside the
/// span carries less than this share of its `B^-1` norm.
const DEPENDENCE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Equality,
    Inequality,
}

/// A linear constraint `a'd (= | >=) rhs` on the QP step.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub rhs: f64,
    pub kind: ConstraintKind,
}

impl LinearConstraint {
    pub fn equality(coefficients: Vec<f64>, rhs: f64) -> Self {
        Self {
            coefficients,
            rhs,
            kind: ConstraintKind::Equality,
        }
    }

    pub fn inequality(coefficients: Vec<f64>, rhs: f64) -> Self {
        Self {
            coefficients,
            rhs,
            kind: ConstraintKind::Inequality,
        }
    }

    fn is_equality(&self) -> bool {
        self.kind == ConstraintKind::Equality
    }

    /// `a'd - rhs` and the tolerance it is compared against at `d`.
    fn slack(&self, d: &[f64]) -> (f64, f64) {
        let ad = vec_dot(&self.coefficients, d);
        let margin = FEASIBILITY_TOLERANCE * (1.0 + ad.abs() + self.rhs.abs());
        (ad - self.rhs, margin)
    }
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Primal step `d`.
    pub step: Vec<f64>,
    /// One multiplier per constraint row, in input order, with
    /// `Bd + g = sum_k multipliers[k] a_k`. Inequality multipliers are
    /// non-negative; rows off the working set get zero.
    pub multipliers: Vec<f64>,
}

/// Why [`solve_qp`] returned no step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpFailure {
    /// No step satisfies every row.
    Inconsistent,
    /// The working-set updates cycled or hit a numerically singular reduced
    /// system. Says nothing about feasibility.
    Stalled,
}

/// A row on the working set. Equalities violated from above enter with
/// `sign = -1` so every working row reads `sign * a'd >= sign * rhs`.
#[derive(Debug, Clone, Copy)]
struct WorkingRow {
    index: usize,
    sign: f64,
}

/// Solve the QP given the Cholesky factor of `B`.
pub fn solve_qp(
    hessian_factor: &[Vec<f64>],
    gradient: &[f64],
    constraints: &[LinearConstraint],
) -> Result<QpSolution, QpFailure> {
    let n = gradient.len();
    let m = constraints.len();

    let mut step: Vec<f64> = cholesky_solve(hessian_factor, gradient)
        .into_iter()
        .map(|v| -v)
        .collect();
    // B^-1 a_k for every row.
    let scaled: Vec<Vec<f64>> = constraints
        .iter()
        .map(|c| cholesky_solve(hessian_factor, &c.coefficients))
        .collect();

    let mut working: Vec<WorkingRow> = Vec::new();
    let mut duals: Vec<f64> = Vec::new();
    let mut settled = vec![false; m];
    let max_updates = 10 * (n + m) + 50;
    let mut updates = 0;

    loop {
        let Some(p) = next_violated(constraints, &step, &working, &settled) else {
            let mut multipliers = vec![0.0; m];
            for (row, u) in working.iter().zip(duals.iter()) {
                multipliers[row.index] = row.sign * u;
            }
            return Ok(QpSolution { step, multipliers });
        };

        let row = &constraints[p];
        let sign = if row.is_equality() && row.slack(&step).0 > 0.0 {
            -1.0
        } else {
            1.0
        };
        let normal: Vec<f64> = row.coefficients.iter().map(|a| sign * a).collect();
        let scaled_normal: Vec<f64> = scaled[p].iter().map(|a| sign * a).collect();
        let target = sign * row.rhs;

        let mut trial = duals.clone();
        trial.push(0.0);

        loop {
            updates += 1;
            if updates > max_updates {
                return Err(QpFailure::Stalled);
            }

            let r = working_set_coefficients(constraints, &scaled, &working, &scaled_normal)
                .ok_or(QpFailure::Stalled)?;

            // Primal direction: the part of B^-1 n_p outside the working span.
            let mut direction = scaled_normal.clone();
            for (ri, w) in r.iter().zip(working.iter()) {
                for (z, s) in direction.iter_mut().zip(scaled[w.index].iter()) {
                    *z -= ri * w.sign * s;
                }
            }
            let curvature = vec_dot(&direction, &normal);
            let dependent = curvature <= DEPENDENCE_TOLERANCE * vec_dot(&normal, &scaled_normal);

            // Largest dual step before a working inequality's multiplier hits zero.
            let mut blocking: Option<(usize, f64)> = None;
            for (i, w) in working.iter().enumerate() {
                if constraints[w.index].is_equality() || r[i] <= 0.0 {
                    continue;
                }
                let ratio = trial[i] / r[i];
                if blocking.map_or(true, |(_, t)| ratio < t) {
                    blocking = Some((i, ratio));
                }
            }

            let nd = vec_dot(&normal, &step);
            let slack = nd - target;
            let margin = FEASIBILITY_TOLERANCE * (1.0 + nd.abs() + target.abs());

            if dependent {
                if slack >= -margin {
                    settled[p] = true;
                    break;
                }
                let Some((l, t)) = blocking else {
                    return Err(QpFailure::Inconsistent);
                };
                shift_duals(&mut trial, &r, t);
                working.remove(l);
                trial.remove(l);
                continue;
            }

            let full_step = -slack / curvature;
            let (t, dropped) = match blocking {
                Some((l, partial)) if partial < full_step => (partial, Some(l)),
                _ => (full_step, None),
            };
            for (d, z) in step.iter_mut().zip(direction.iter()) {
                *d += t * z;
            }
            shift_duals(&mut trial, &r, t);

            match dropped {
                Some(l) => {
                    working.remove(l);
                    trial.remove(l);
                }
                None => {
                    working.push(WorkingRow { index: p, sign });
                    duals = trial;
                    if row.is_equality() {
                        settled[p] = true;
                    }
                    break;
                }
            }
        }
    }
}

/// First equality not yet on the working set, else the most violated
/// inequality off it.
fn next_violated(
    constraints: &[LinearConstraint],
    step: &[f64],
    working: &[WorkingRow],
    settled: &[bool],
) -> Option<usize> {
    if let Some(k) = constraints
        .iter()
        .enumerate()
        .position(|(k, c)| c.is_equality() && !settled[k])
    {
        return Some(k);
    }

    let mut worst: Option<(usize, f64)> = None;
    for (k, c) in constraints.iter().enumerate() {
        if c.is_equality() || working.iter().any(|w| w.index == k) {
            continue;
        }
        let (slack, margin) = c.slack(step);
        if slack < -margin && worst.map_or(true, |(_, s)| slack < s) {
            worst = Some((k, slack));
        }
    }
    worst.map(|(k, _)| k)
}

/// Solve `(N' B^-1 N) r = N' B^-1 n_p` over the signed working rows `N`.
fn working_set_coefficients(
    constraints: &[LinearConstraint],
    scaled: &[Vec<f64>],
    working: &[WorkingRow],
    scaled_normal: &[f64],
) -> Option<Vec<f64>> {
    let reduced: Vec<Vec<f64>> = working
        .iter()
        .map(|wi| {
            working
                .iter()
                .map(|wj| {
                    wi.sign
                        * wj.sign
                        * vec_dot(&constraints[wi.index].coefficients, &scaled[wj.index])
                })
                .collect()
        })
        .collect();
    let rhs: Vec<f64> = working
        .iter()
        .map(|w| w.sign * vec_dot(&constraints[w.index].coefficients, scaled_normal))
        .collect();
    solve_linear_system(&reduced, &rhs)
}

/// Move the duals by `t` along `(-r, 1)`; the last entry belongs to the
/// row being added.
fn shift_duals(trial: &mut [f64], r: &[f64], t: f64) {
    for (u, ri) in trial.iter_mut().zip(r.iter()) {
        *u -= t * ri;
    }
    if let Some(last) = trial.last_mut() {
        *last += t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{cholesky, identity};

    fn solve(
        hessian: Vec<Vec<f64>>,
        gradient: Vec<f64>,
        rows: Vec<LinearConstraint>,
    ) -> Result<QpSolution, QpFailure> {
        let factor = cholesky(&hessian).unwrap();
        solve_qp(&factor, &gradient, &rows)
    }

    #[test]
    fn test_unconstrained_newton_step() {
        let sol = solve(vec![vec![2.0, 0.0], vec![0.0, 4.0]], vec![-2.0, 8.0], vec![]).unwrap();
        assert!((sol.step[0] - 1.0).abs() < 1e-12);
        assert!((sol.step[1] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_equality_projection() {
        // min ½|d|² - d0 s.t. d0 + d1 = 0  =>  d = (0.5, -0.5), lambda = -0.5
        let sol = solve(
            identity(2),
            vec![-1.0, 0.0],
            vec![LinearConstraint::equality(vec![1.0, 1.0], 0.0)],
        )
        .unwrap();
        assert!((sol.step[0] - 0.5).abs() < 1e-10);
        assert!((sol.step[1] + 0.5).abs() < 1e-10);
        assert!((sol.multipliers[0] + 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_inactive_inequality_has_zero_multiplier() {
        let sol = solve(
            identity(1),
            vec![-1.0],
            vec![LinearConstraint::inequality(vec![-1.0], -5.0)],
        )
        .unwrap();
        assert!((sol.step[0] - 1.0).abs() < 1e-12);
        assert_eq!(sol.multipliers[0], 0.0);
    }

    #[test]
    fn test_active_inequality_binds() {
        // min ½d² - 3d s.t. d <= 1
        let sol = solve(
            identity(1),
            vec![-3.0],
            vec![LinearConstraint::inequality(vec![-1.0], -1.0)],
        )
        .unwrap();
        assert!((sol.step[0] - 1.0).abs() < 1e-10);
        assert!((sol.multipliers[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_simplex_vertex_with_every_bound_tight() {
        // Iterate sits at (0, 1): budget d0 + d1 = 0, lower bound d0 >= 0,
        // upper bound -d1 >= 0. The gradient pushes towards asset 0 leaving,
        // so the step is zero with the budget and lower bound carrying it.
        let sol = solve(
            identity(2),
            vec![1.0, -1.0],
            vec![
                LinearConstraint::equality(vec![1.0, 1.0], 0.0),
                LinearConstraint::inequality(vec![1.0, 0.0], 0.0),
                LinearConstraint::inequality(vec![0.0, -1.0], 0.0),
            ],
        )
        .unwrap();
        assert!(sol.step.iter().all(|d| d.abs() < 1e-12));
        assert!(sol.multipliers[1] >= 0.0);
        assert!(sol.multipliers[2] >= 0.0);
        // Bd + g = A' lambda
        let residual0 = sol.step[0] + 1.0 - sol.multipliers[0] - sol.multipliers[1];
        let residual1 = sol.step[1] - 1.0 - sol.multipliers[0] + sol.multipliers[2];
        assert!(residual0.abs() < 1e-10);
        assert!(residual1.abs() < 1e-10);
    }

    #[test]
    fn test_dependent_row_swaps_out_blocking_bound() {
        // min ½|d|² + 2 d0 - d1 s.t. d0 + d1 = 0, d0 >= 0, d1 <= -0.5.
        // The third row lies in the span of the first two once they are
        // working, so d0 >= 0 has to leave. Optimum d = (0.5, -0.5).
        let sol = solve(
            identity(2),
            vec![2.0, -1.0],
            vec![
                LinearConstraint::equality(vec![1.0, 1.0], 0.0),
                LinearConstraint::inequality(vec![1.0, 0.0], 0.0),
                LinearConstraint::inequality(vec![0.0, -1.0], 0.5),
            ],
        )
        .unwrap();
        assert!((sol.step[0] - 0.5).abs() < 1e-10);
        assert!((sol.step[1] + 0.5).abs() < 1e-10);
        assert!((sol.multipliers[0] - 2.5).abs() < 1e-10);
        assert_eq!(sol.multipliers[1], 0.0);
        assert!((sol.multipliers[2] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_duplicate_equality_is_redundant() {
        let row = LinearConstraint::equality(vec![1.0, 1.0], 0.0);
        let sol = solve(identity(2), vec![-1.0, 0.0], vec![row.clone(), row]).unwrap();
        assert!((sol.step[0] - 0.5).abs() < 1e-10);
        assert!((sol.step[1] + 0.5).abs() < 1e-10);
        assert!((sol.multipliers[0] + sol.multipliers[1] + 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_parallel_equalities_at_different_levels_are_inconsistent() {
        let sol = solve(
            identity(2),
            vec![0.0, 0.0],
            vec![
                LinearConstraint::equality(vec![1.0, 1.0], 0.0),
                LinearConstraint::equality(vec![1.0, 1.0], 1.0),
            ],
        );
        assert_eq!(sol.unwrap_err(), QpFailure::Inconsistent);
    }

    #[test]
    fn test_inconsistent_constraints_rejected() {
        // d >= 1 and d <= -1
        let sol = solve(
            identity(1),
            vec![0.0],
            vec![
                LinearConstraint::inequality(vec![1.0], 1.0),
                LinearConstraint::inequality(vec![-1.0], 1.0),
            ],
        );
        assert_eq!(sol.unwrap_err(), QpFailure::Inconsistent);
    }

    #[test]
    fn test_zero_row_with_positive_rhs_is_infeasible() {
        let sol = solve(
            identity(2),
            vec![0.0, 0.0],
            vec![LinearConstraint::inequality(vec![0.0, 0.0], 0.5)],
        );
        assert_eq!(sol.unwrap_err(), QpFailure::Inconsistent);
    }

    #[test]
    fn test_ill_conditioned_hessian_still_solves() {
        // Condition number 1e8 with a budget row and both bounds.
        let hessian = vec![vec![1e4, 0.0], vec![0.0, 1e-4]];
        let sol = solve(
            hessian,
            vec![-1.0, -1.0],
            vec![
                LinearConstraint::equality(vec![1.0, 1.0], 0.0),
                LinearConstraint::inequality(vec![0.0, -1.0], -0.25),
            ],
        )
        .unwrap();
        assert!((sol.step[0] + sol.step[1]).abs() < 1e-10);
        assert!(sol.step[1] <= 0.25 + 1e-10);
    }
}
