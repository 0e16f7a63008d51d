pub mod irr;
pub mod metrics;
