pub mod amortization;
pub mod ratios;
