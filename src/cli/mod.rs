//! Command-line interface
//!
//! Argument parsing for the por-bridge binary and the handlers that run
//! each subcommand against the configured engine.

pub mod commands;
pub mod runner;

pub use commands::{BitsArg, Command, HexArg, Opt};
pub use runner::execute;
