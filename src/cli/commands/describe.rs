//! `catalink describe` command - Generate object descriptions
//!
//! Reads the linked groups written by `catalink link`, looks up each
//! object's catalogue metadata and sends prompt plus images to the
//! configured chat-completions endpoint.

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::helpers::{load_config, truncate_str};
use crate::cli::GlobalOpts;
use crate::core::catalog::{CatalogGenerator, PreparedObject};
use crate::core::describe::{ChatClient, DescribeError, Describer};
use crate::core::report::{read_linked, write_descriptions, DescriptionRow};
use crate::core::sheets::MetadataTable;

#[derive(clap::Args, Debug)]
pub struct DescribeArgs {
    /// Linked groups CSV written by `catalink link` (default: linked.csv)
    #[arg(long)]
    pub linked: Option<PathBuf>,

    /// Result CSV (default: catalog_results.csv)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Number of linked groups to describe
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Image root holding one directory per year
    #[arg(long)]
    pub image_root: Option<PathBuf>,

    /// Print prompts and images without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation before sending requests
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Stand-in used by --dry-run
struct DryRun;

impl Describer for DryRun {
    fn describe(&self, _prompt: &str, _images: &[PathBuf]) -> Result<String, DescribeError> {
        Ok(String::new())
    }
}

pub fn run(args: DescribeArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;

    let linked_path = args.linked.clone().unwrap_or_else(|| config.linked_csv());
    let output = args
        .output
        .clone()
        .or_else(|| config.describe.output.clone())
        .unwrap_or_else(|| PathBuf::from("catalog_results.csv"));
    let image_root = args.image_root.clone().unwrap_or_else(|| config.image_root());
    let limit = args.limit.or(config.describe.limit).unwrap_or(3);

    if !linked_path.exists() {
        return Err(miette::miette!(
            "File not found: {} (run 'catalink link' first)",
            linked_path.display()
        ));
    }

    let rows = read_linked(&linked_path).into_diagnostic()?;
    if rows.is_empty() {
        eprintln!(
            "{} {} is empty - nothing to do",
            style("!").yellow(),
            linked_path.display()
        );
        if !args.dry_run {
            let saved = write_descriptions(&output, &[]).into_diagnostic()?;
            println!(
                "{} Results saved to {}",
                style("✓").green(),
                style(saved.display()).cyan()
            );
        }
        return Ok(());
    }

    let metadata = MetadataTable::load(&config.sheet_dir(), &config.sources());
    if metadata.is_empty() {
        eprintln!(
            "{} No catalogue metadata loaded; prompts will only carry the inventory number",
            style("!").yellow()
        );
    }

    let count = limit.min(rows.len());
    let labels = &config.describe.labels;

    if args.dry_run {
        let generator = CatalogGenerator::new(&image_root, &metadata, labels, DryRun);
        generator.run(&rows, limit, Duration::ZERO, print_prompt, |_, _| {});
        println!();
        println!(
            "{}",
            style(format!(
                "Dry run complete. {} object(s) prepared, no requests sent.",
                count
            ))
            .yellow()
        );
        return Ok(());
    }

    let api_key = config.api_key().map_err(|e| miette::miette!("{}", e))?;
    let model = config.describe.model.clone().unwrap_or_default();

    if !args.yes {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Send {} object(s) to {}?", count, model))
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let pause = config.describe.pause();
    let client = ChatClient::new(&config.describe, api_key);
    let generator = CatalogGenerator::new(&image_root, &metadata, labels, client);
    let verbose = global.verbose;

    let results = generator.run(
        &rows,
        limit,
        pause,
        |object| {
            if verbose {
                print_prompt(object);
            }
            println!(
                "{} {}: {} image(s) → requesting description",
                style("→").blue(),
                style(&object.obj_id).cyan(),
                object.images.len()
            );
        },
        print_result,
    );

    let failed = results
        .iter()
        .filter(|r| r.description.starts_with("ERROR:"))
        .count();
    let saved = write_descriptions(&output, &results).into_diagnostic()?;

    println!();
    println!(
        "{} {} description(s) saved to {}",
        style("✓").green(),
        results.len() - failed,
        style(saved.display()).cyan()
    );
    if failed > 0 {
        println!("  {} failed: {}", style("✗").red(), style(failed).red());
    }

    Ok(())
}

fn print_prompt(object: &PreparedObject) {
    println!();
    println!("{}", style(format!("--- Prompt for {} ---", object.obj_id)).dim());
    println!("{}", object.prompt);
    for image in &object.images {
        println!("  {} {}", style("image").dim(), image.display());
    }
    println!("{}", style("--- end of prompt ---").dim());
}

fn print_result(object: &PreparedObject, result: &DescriptionRow) {
    if let Some(error) = result.description.strip_prefix("ERROR: ") {
        eprintln!(
            "{} {}: {}",
            style("✗").red(),
            object.obj_id,
            style(error).red()
        );
    } else {
        println!(
            "{} {}: {}",
            style("✓").green(),
            object.obj_id,
            truncate_str(&result.description.replace('\n', " "), 60)
        );
    }
}
