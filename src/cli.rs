// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vanguard-report")]
#[command(version)]
#[command(about = "Builds the report for one scanned target from its stored findings.", long_about = None)]
pub struct Args {
    /// Object id of the target to report on (24 hex characters).
    #[arg(short = 't', long = "target-id")]
    pub target_id: String,

    /// TOML settings file. Defaults to config.toml in the data directory.
    #[arg(short, long, env = "VANGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Mirror log output to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}
