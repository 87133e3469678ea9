//! CLI argument parsing and command dispatch.

pub mod args;
pub mod compare;
pub mod config;
pub mod request;
pub mod reset;
pub mod status;

pub use args::{Cli, Commands, ConfigCommand, OutputFormat};
