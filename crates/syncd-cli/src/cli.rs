use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "syncd", about = "Bridges an ERP/POS system with the delivery-management cloud", version)]
pub struct Cli {
    /// Path to the daemon's YAML configuration file.
    #[arg(long, env = "SYNCD_CONFIG", default_value = "syncd.yaml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon: acquires the single-instance lock and runs until
    /// signalled to stop.
    Run,

    /// Print a summary of the tracking store's current contents.
    Status,

    /// Force an out-of-schedule retention sweep.
    Prune,
}
