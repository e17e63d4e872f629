//! General-purpose constrained nonlinear minimisation.
//!
//! `slsqp::minimize` solves
//!
//! ```text
//! min f(x)  s.t.  c_eq(x) = 0,  c_in(x) >= 0,  lb <= x <= ub
//! ```
//!
//! for any [`ConstrainedProblem`]. Nothing in here knows about portfolios.

pub mod problem;
pub mod qp;
pub mod slsqp;

pub use problem::ConstrainedProblem;
pub use slsqp::{minimize, SqpOutcome, SqpSettings, SqpStatus};
