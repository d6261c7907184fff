use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "nsp-audit")]
#[command(about = "Audit a local game library against the titledb catalog", long_about = None)]
pub struct Cli {
    /// Folder to scan for this run only (not saved)
    #[arg(short = 'f', value_name = "PATH")]
    pub folder: Option<PathBuf>,

    /// Scan sub folders; only `false` overrides the saved setting
    #[arg(short = 'r', value_name = "BOOL")]
    pub recursive: Option<bool>,

    /// Deprecated, has no effect
    #[arg(short = 'm', value_name = "MODE", hide = true)]
    pub mode: Option<String>,

    /// Folder holding settings.json, the cached catalog files and prod.keys
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub base_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Commands {
    /// Download the catalog, scan the library and print reports (default)
    Audit,
    /// Print configuration values
    PrintConfig,
}
