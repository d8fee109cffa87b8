//! Command-line interface definition.

use crate::core::types::ScanMode;
use clap::Parser;
use std::path::PathBuf;

/// packscan: identify the packer/protector of Windows PE executables
#[derive(Parser, Debug)]
#[command(name = "packscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// PE files to scan
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Signature database file (defaults to the configured path)
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Scan mode (defaults to the configured mode)
    #[arg(short, long)]
    pub mode: Option<ScanMode>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// List each file's imported modules and APIs
    #[arg(long)]
    pub show_imports: bool,

    /// Report each file's Shannon entropy
    #[arg(long)]
    pub entropy: bool,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
