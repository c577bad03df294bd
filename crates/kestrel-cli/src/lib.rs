//! # kestrel-cli
//!
//! Command-line interface for the Kestrel agent runtime.
//!
//! ## Commands
//!
//! - `kestrel start`: run the agent (plugins + HTTP API) until Ctrl-C
//! - `kestrel status`: query a running agent over HTTP
//! - `kestrel config`: show the effective configuration
//! - `kestrel doctor`: validate the configuration
//! - `kestrel plugins`: list the plugins the config enables
//! - `kestrel cache`: inspect the plugin state cache
//! - `kestrel version`

pub mod bootstrap;
pub mod commands;
pub mod logging;

pub use commands::Cli;
