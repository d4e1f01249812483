//! Command-line arguments.

use clap::{Parser, Subcommand};
use perdiem_core::CacheBackend;
use std::path::PathBuf;

/// Look up foreign per-diem travel rates
#[derive(Debug, Parser)]
#[command(name = "perdiem", version, about = "Look up foreign per-diem travel rates")]
pub struct Cli {
    /// Configuration file (defaults to the XDG config directory).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Cache backend: memory, file or sqlite.
    #[arg(long, global = true, value_name = "BACKEND")]
    pub cache: Option<CacheBackend>,

    /// Print JSON instead of a table.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Look up the rates for one 5-digit location code.
    Lookup {
        /// Location code, e.g. 11410
        code: String,

        /// Skip the cache and always query the rate site.
        #[arg(long)]
        force: bool,
    },

    /// Look up several location codes, one after another.
    Batch {
        /// Location codes
        codes: Vec<String>,

        /// Read additional codes from a file (whitespace or comma separated).
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}
