pub mod frontier;
pub mod optimizer;
pub mod performance;
pub mod problem;
