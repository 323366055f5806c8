//! CLI module for the pteraform tool.
//!
//! This module provides the command-line interface for driving
//! `pteraform_apply` units from a local configuration file.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, StateCommands};
pub use output::OutputFormatter;
