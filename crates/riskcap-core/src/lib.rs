pub mod error;
pub mod linalg;
pub mod solver;
pub mod types;

#[cfg(feature = "allocation")]
pub mod allocation;

#[cfg(feature = "estimation")]
pub mod estimation;

#[cfg(feature = "reporting")]
pub mod reporting;

pub use error::RiskcapError;
pub use types::*;

/// Standard result type for all riskcap operations
pub type RiskcapResult<T> = Result<T, RiskcapError>;
