//! Operator command line.

mod commands;

pub use commands::{is_verbose, run};
