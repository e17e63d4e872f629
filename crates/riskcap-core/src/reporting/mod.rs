//! Pure builders for presenting an optimisation result. Nothing here
//! touches the solver; every function takes the result it reports on.

pub mod allocation;
pub mod evolution;
pub mod frontier_cloud;
