pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "financing")]
pub mod financing;

#[cfg(feature = "returns")]
pub mod returns;

#[cfg(feature = "development")]
pub mod development;

#[cfg(feature = "distribution")]
pub mod distribution;

#[cfg(feature = "appraisal")]
pub mod appraisal;

pub use error::DealEngineError;
pub use types::*;

/// Standard result type for all deal-engine operations
pub type DealEngineResult<T> = Result<T, DealEngineError>;
