pub mod capex;
pub mod timeline;
