use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

/// Output format for CLI commands.
///
/// Provides consistent output formatting across all CLI commands.
/// Defaults to human-readable table format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table output with colors
    #[default]
    Table,
    /// Machine-readable JSON output
    Json,
}

/// Create a formatted table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{bytes}B")
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2}KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2}MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2}GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Print error message
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "ERROR:".bright_red().bold(), msg);
}

/// Print warning message
#[allow(dead_code)]
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "WARNING:".bright_yellow().bold(), msg);
}

/// Print success message
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".bright_green().bold(), msg);
}

/// Print info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_color() {
        colored::control::set_override(false);
    }

    #[test]
    fn format_bytes_formats_units() {
        assert_eq!(format_bytes(1023), "1023B");
        assert_eq!(format_bytes(1024), "1.00KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00GB");
    }

    #[test]
    fn print_helpers_do_not_panic() {
        no_color();
        print_error("boom");
        print_warning("careful");
        print_success("done");
        print_info("fyi");
    }
}
