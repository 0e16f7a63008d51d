pub mod appraisal;
pub mod development;
pub mod distribution;
pub mod financing;
pub mod returns;
