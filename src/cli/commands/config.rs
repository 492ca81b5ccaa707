//! `catalink config` command - Configuration management
//!
//! Shows the effective configuration, where it is read from, and writes a
//! starter project config.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::PathBuf;

use crate::cli::helpers::load_config;
use crate::cli::GlobalOpts;
use crate::core::config::{Config, API_KEY_VAR, PROJECT_CONFIG_FILE};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration as YAML
    Show,

    /// Show paths to configuration files
    Path,

    /// Write a project config with the built-in defaults
    Init(InitArgs),
}

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Where to write the config (default: ./catalink.yaml)
    #[arg(default_value = PROJECT_CONFIG_FILE)]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show => run_show(global),
        ConfigCommands::Path => run_path(global),
        ConfigCommands::Init(args) => run_init(args),
    }
}

fn run_show(global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let yaml = serde_yml::to_string(&config).into_diagnostic()?;
    print!("{}", yaml);
    Ok(())
}

fn run_path(global: &GlobalOpts) -> Result<()> {
    println!("{}", style("Configuration file paths:").bold());
    println!();

    match Config::global_config_path() {
        Some(path) => print_path("Global:", &path),
        None => println!(
            "  {} {}",
            style("Global:").cyan(),
            style("(no config directory)").dim()
        ),
    }

    let project = global
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    print_path("Project:", &project);

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. Command-line flags");
    println!(
        "  2. Environment variables (CATALINK_IMAGE_ROOT, CATALINK_SHEET_DIR, {})",
        API_KEY_VAR
    );
    println!("  3. Project config (--config or ./{})", PROJECT_CONFIG_FILE);
    println!("  4. Global config");
    println!("  5. Built-in defaults");
    Ok(())
}

fn print_path(label: &str, path: &std::path::Path) {
    let state = if path.exists() {
        style("(exists)").green()
    } else {
        style("(not created)").dim()
    };
    println!("  {} {} {}", style(label).cyan(), path.display(), state);
}

fn run_init(args: InitArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        return Err(miette::miette!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        ));
    }

    let yaml = serde_yml::to_string(&Config::defaults()).into_diagnostic()?;
    let contents = format!(
        "# Catalink configuration\n# Relative paths resolve against the working directory.\n{}",
        yaml
    );

    if let Some(parent) = args.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    fs::write(&args.path, contents).into_diagnostic()?;

    println!(
        "{} Wrote {}",
        style("✓").green(),
        style(args.path.display()).cyan()
    );
    Ok(())
}
