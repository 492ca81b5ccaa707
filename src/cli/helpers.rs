//! Shared helper functions for CLI commands

use miette::Result;

use crate::cli::GlobalOpts;
use crate::core::Config;

/// Load the layered configuration for a command
pub fn load_config(global: &GlobalOpts) -> Result<Config> {
    Config::load(global.config.as_deref()).map_err(|e| miette::miette!("{}", e))
}

/// Truncate a string to max_len characters, adding "..." if truncated
///
/// Counts characters rather than bytes; catalogue text is full of umlauts.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format a list of file names for a table cell
///
/// Shows up to `max` names and a "+N more" suffix.
pub fn format_file_list(names: &[String], max: usize) -> String {
    if names.len() <= max {
        return names.join(", ");
    }
    format!("{}, +{} more", names[..max].join(", "), names.len() - max)
}
