//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs, config::ConfigCommands, describe::DescribeArgs, link::LinkArgs,
};

#[derive(Parser)]
#[command(name = "catalink")]
#[command(author, version, about = "Catalink museum image linker")]
#[command(long_about = "Links scanned museum object images to catalogue spreadsheet records \
    by inventory number, and generates object descriptions from images and metadata.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Config file (default: ./catalink.yaml if present)
    #[arg(long, short = 'c', global = true, env = "CATALINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

impl GlobalOpts {
    /// Log level implied by --quiet / --verbose
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            log::LevelFilter::Error
        } else if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Link spreadsheet inventory numbers to image files
    Link(LinkArgs),

    /// Generate object descriptions for linked groups
    Describe(DescribeArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}
