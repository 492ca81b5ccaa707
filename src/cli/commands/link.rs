//! `catalink link` command - Link inventory numbers to image files

use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{format_file_list, load_config, truncate_str};
use crate::cli::GlobalOpts;
use crate::core::links::{aggregate, LinkReport};
use crate::core::report::{write_linked, write_misses};
use crate::core::resolver::DirectoryResolver;
use crate::core::sheets::load_rows;
use crate::core::SourceSpec;

#[derive(clap::Args, Debug)]
pub struct LinkArgs {
    /// Image root holding one directory per year
    #[arg(long)]
    pub image_root: Option<PathBuf>,

    /// Directory containing the spreadsheet exports
    #[arg(long)]
    pub sheet_dir: Option<PathBuf>,

    /// Spreadsheet export as FILE or FILE:START-STOP (repeatable, replaces configured sources)
    #[arg(long = "source", short = 's')]
    pub sources: Vec<SourceSpec>,

    /// Linked groups CSV (default: linked.csv)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Miss report CSV (default: linked_misses.csv)
    #[arg(long)]
    pub misses: Option<PathBuf>,

    /// Number of linked groups to show as examples
    #[arg(long, default_value_t = 10)]
    pub samples: usize,
}

pub fn run(args: LinkArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;

    let image_root = args.image_root.clone().unwrap_or_else(|| config.image_root());
    let sheet_dir = args.sheet_dir.clone().unwrap_or_else(|| config.sheet_dir());
    let sources = if args.sources.is_empty() {
        config.sources()
    } else {
        args.sources.clone()
    };
    let output = args.output.clone().unwrap_or_else(|| config.linked_csv());
    let misses_path = args.misses.clone().unwrap_or_else(|| config.misses_csv());
    let pattern = config.id_pattern().map_err(|e| miette::miette!("{}", e))?;

    if !global.quiet {
        for spec in &sources {
            println!(
                "{} Reading {}",
                style("→").blue(),
                style(spec.to_string()).yellow()
            );
        }
    }

    let rows = load_rows(&sheet_dir, &sources);
    if rows.is_empty() {
        eprintln!("{} No spreadsheet rows loaded", style("!").yellow());
        write_linked(&output, &[]).into_diagnostic()?;
        println!("CSV: {}", output.display());
        return Ok(());
    }

    let mut resolver = DirectoryResolver::with_extensions(&image_root, config.allowed_extensions())
        .map_err(|e| miette::miette!("{}", e))?;

    log::debug!(
        "matching {} identifier rows under {} with pattern {}",
        rows.len(),
        resolver.root().display(),
        pattern.as_str()
    );
    let report = aggregate(&rows, &pattern, &mut resolver);

    write_linked(&output, &report.linked).into_diagnostic()?;
    if !report.misses.is_empty() {
        write_misses(&misses_path, &report.misses).into_diagnostic()?;
    } else if misses_path.is_file() {
        // A report left over from an earlier run would no longer match linked.csv
        fs::remove_file(&misses_path).into_diagnostic()?;
        if !global.quiet {
            println!(
                "{} Removed stale {}",
                style("→").blue(),
                style(misses_path.display()).yellow()
            );
        }
    }

    print_summary(&report, global);
    if !global.quiet && !report.linked.is_empty() && args.samples > 0 {
        print_samples(&report, args.samples);
    }

    println!();
    println!("{} Linked groups: {}", style("✓").green(), style(output.display()).cyan());
    if !report.misses.is_empty() {
        println!(
            "{} Misses:        {}",
            style("✗").red(),
            style(misses_path.display()).cyan()
        );
    }

    Ok(())
}

fn print_summary(report: &LinkReport, global: &GlobalOpts) {
    if global.quiet {
        println!(
            "{} linked, {} missed",
            report.linked.len(),
            report.misses.len()
        );
        return;
    }

    println!();
    println!("{}", style("─".repeat(50)).dim());
    println!("{}", style("Link Summary").bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  Spreadsheet rows:     {}", style(report.rows).cyan());
    println!("  Distinct identifiers: {}", style(report.distinct_ids).cyan());
    println!("  Linked groups:        {}", style(report.linked.len()).green());
    println!("  Linked images:        {}", style(report.image_count()).green());
    if report.misses.is_empty() {
        println!("  Misses:               {}", style(0).dim());
    } else {
        println!("  Misses:               {}", style(report.misses.len()).red());
    }
}

fn print_samples(report: &LinkReport, count: usize) {
    let mut table = Builder::default();
    table.push_record(["Identifier", "Year", "Prefix", "Images", "Files"]);
    for group in report.linked.iter().take(count) {
        table.push_record([
            truncate_str(&group.representative_id, 30),
            group.year.clone(),
            group.prefix.clone(),
            group.image_count().to_string(),
            format_file_list(&group.matched_files, 2),
        ]);
    }

    let rendered = table.build().with(Style::markdown()).to_string();
    println!();
    println!("{}", style("Examples").bold());
    println!("{}", rendered);
}
