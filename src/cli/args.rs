//! Command line argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Release pipeline for mobile apps
#[derive(Parser, Debug)]
#[command(
    name = "mobile_release",
    version,
    about = "Build, sign, validate and deploy mobile apps to multiple destinations",
    long_about = "Builds each artifact kind the enabled destinations need exactly once, signs what must be signed, validates the result and deploys to every destination concurrently.

Usage:
  mobile_release run
  mobile_release --config android/release.toml run --yes
  mobile_release plan
  mobile_release cache status

Exit code 0 = every destination received its release."
)]
pub struct Args {
    /// Pipeline configuration file
    #[arg(
        short,
        long,
        value_name = "PATH",
        default_value = "release.toml",
        env = "MOBILE_RELEASE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Show toolchain output and debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the full pipeline
    Run {
        /// Deploy without asking when validation reports warnings
        #[arg(short, long)]
        yes: bool,

        /// Print the final report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Upper bound on concurrent uploads
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,
    },

    /// Show which artifacts each enabled destination needs, without building
    Plan,

    /// Inspect or clear the build cache
    Cache {
        /// Cache operation
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show where each external tool was found
    Tools,
}

/// `cache` operations.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// List cached build digests
    Status,
    /// Forget every cached digest so the next run rebuilds
    Clear,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
