//! Configuration file types, persistence and target address resolution.

pub mod persistence;
pub mod resolve;
pub mod types;
