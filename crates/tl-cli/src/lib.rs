//! Replicated time log CLI library.
//!
//! This crate provides the CLI interface for the time log.

mod cli;
pub mod commands;
mod config;
pub mod document;
pub mod machine;

pub use cli::{Cli, Commands, LogAction};
pub use config::{Config, ResortSettings};
