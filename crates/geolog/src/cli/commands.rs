//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::Config;

/// Serve command arguments.
#[derive(Debug, Default, Args)]
pub struct ServeCommand {
    /// Interface to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Collection file to append to
    #[arg(short, long, value_name = "FILE")]
    pub data_file: Option<PathBuf>,

    /// HTML page served at /
    #[arg(long, value_name = "FILE")]
    pub index: Option<PathBuf>,
}

impl ServeCommand {
    /// Overlay the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(data_file) = &self.data_file {
            config.storage.data_file.clone_from(data_file);
        }
        if let Some(index) = &self.index {
            config.server.index_path.clone_from(index);
        }
    }
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output the records as a JSON array
    #[arg(short, long)]
    pub json: bool,

    /// Only show the most recent N records
    #[arg(short, long, value_name = "N")]
    pub last: Option<usize>,

    /// Collection file to read
    #[arg(short, long, value_name = "FILE")]
    pub data_file: Option<PathBuf>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to config file (uses default if not specified)
        file: Option<PathBuf>,
    },
}
