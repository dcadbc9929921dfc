//! Configuration management
//!
//! Engine settings are read from a TOML file, then overridden by `POR_*`
//! environment variables. The library engine takes an explicit
//! [`EngineConfig`]; the command line front end reads [`GLOBAL_CONFIG`].

pub mod settings;

pub use settings::{Config, EngineConfig, GLOBAL_CONFIG};
