//! SQL query implementations.

pub mod instances;
