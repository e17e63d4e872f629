pub mod allocate;
pub mod cloud;
pub mod estimate;
pub mod evaluate;
pub mod evolution;
pub mod frontier;
pub mod optimize;
