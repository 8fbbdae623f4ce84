//! Operator-facing plumbing: argument parsing and log output.

pub mod check;
pub mod cli;
pub mod logging;
