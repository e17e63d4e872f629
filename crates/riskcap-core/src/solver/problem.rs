use crate::RiskcapResult;

/// A smooth nonlinear program the SQP solver can drive.
///
/// Sign conventions follow SLSQP: equality constraints are satisfied when
/// they evaluate to zero, inequality constraints when they evaluate to a
/// value `>= 0`. Bounds are enforced structurally by the solver (iterates
/// are clamped into the box), so they are not expressed as constraints.
pub trait ConstrainedProblem {
    /// Number of decision variables.
    fn dimension(&self) -> usize;

    /// Objective value. An `Err` marks `x` as a point where the objective is
    /// undefined; the solver backs away from such points.
    fn objective(&self, x: &[f64]) -> RiskcapResult<f64>;

    /// Objective gradient. Defaults to forward differences.
    fn gradient(&self, x: &[f64]) -> RiskcapResult<Vec<f64>> {
        let f0 = self.objective(x)?;
        let mut bumped = x.to_vec();
        let mut grad = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let h = f64::EPSILON.sqrt() * x[i].abs().max(1.0);
            bumped[i] = x[i] + h;
            let f1 = self.objective(&bumped)?;
            bumped[i] = x[i];
            grad.push((f1 - f0) / h);
        }
        Ok(grad)
    }

    fn equality_constraints(&self, _x: &[f64]) -> Vec<f64> {
        Vec::new()
    }

    /// One row per equality constraint.
    fn equality_jacobian(&self, _x: &[f64]) -> Vec<Vec<f64>> {
        Vec::new()
    }

    fn inequality_constraints(&self, _x: &[f64]) -> Vec<f64> {
        Vec::new()
    }

    /// One row per inequality constraint.
    fn inequality_jacobian(&self, _x: &[f64]) -> Vec<Vec<f64>> {
        Vec::new()
    }

    /// Per-variable `(lower, upper)` bounds. Infinite bounds are ignored.
    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); self.dimension()]
    }
}

/// Total constraint violation: `sum |c_eq| + sum max(0, -c_in)`.
pub fn constraint_violation<P: ConstrainedProblem + ?Sized>(problem: &P, x: &[f64]) -> f64 {
    let eq: f64 = problem
        .equality_constraints(x)
        .iter()
        .map(|c| c.abs())
        .sum();
    let ineq: f64 = problem
        .inequality_constraints(x)
        .iter()
        .map(|c| (-c).max(0.0))
        .sum();
    eq + ineq
}
