//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use statehub_common::diff::Hunk;
use statehub_common::{ChangeKind, DiffResult, DiffRow};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    /// Formats meant for other programs; stdout must stay parseable
    pub fn is_structured(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Yaml)
    }
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn serialized<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Option<String> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        _ => return None,
    };
    Some(rendered.unwrap_or_else(|e| {
        print_error(&format!("failed to render output: {}", e));
        String::new()
    }))
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    if let Some(text) = serialized(item, format) {
        println!("{}", text.trim_end());
        return;
    }
    match format {
        OutputFormat::Plain => {
            for (header, value) in T::headers().iter().zip(item.row()) {
                println!("{}: {}", header, value);
            }
        }
        _ => {
            let mut table = new_table();
            table.set_header(T::headers());
            table.add_row(item.row());
            println!("{table}");
        }
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if let Some(text) = serialized(items, format) {
        println!("{}", text.trim_end());
        return;
    }
    if items.is_empty() {
        println!("No items found.");
        return;
    }
    match format {
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                for (header, value) in T::headers().iter().zip(item.row()) {
                    println!("{}: {}", header, value);
                }
            }
        }
        _ => {
            let mut table = new_table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
    }
}

/// Print a diff. Structured formats get the raw rows; otherwise changes are
/// shown either side by side or unified, with `context` unchanged lines kept
/// around each change when folding.
pub fn print_diff(diff: &DiffResult, context: usize, format: OutputFormat) {
    if let Some(text) = serialized(diff, format) {
        println!("{}", text.trim_end());
        return;
    }
    if diff.is_identical() {
        print_info("No differences.");
        return;
    }

    let hunks = diff.hunks(context);
    if diff.options.split_view && format == OutputFormat::Table {
        print_split(&hunks);
    } else {
        print_unified(&hunks);
    }
    println!("{} line(s) changed", diff.changed_lines());
}

fn skipped_marker(skipped: usize) -> String {
    format!("@@ {} unchanged line(s) @@", skipped).dimmed().to_string()
}

fn print_split(hunks: &[Hunk]) {
    let mut table = new_table();
    table.set_header(vec!["#", "Old", "#", "New"]);
    for hunk in hunks {
        if hunk.skipped_before > 0 {
            let marker = skipped_marker(hunk.skipped_before);
            table.add_row(vec![String::new(), marker.clone(), String::new(), marker]);
        }
        for row in &hunk.rows {
            let (ln, lt) = side(row.left.as_ref());
            let (rn, rt) = side(row.right.as_ref());
            let (lt, rt) = match row.kind {
                ChangeKind::Equal => (lt, rt),
                ChangeKind::Modified => (lt.yellow().to_string(), rt.yellow().to_string()),
                ChangeKind::Removed => (lt.red().to_string(), rt),
                ChangeKind::Added => (lt, rt.green().to_string()),
            };
            table.add_row(vec![ln, lt, rn, rt]);
        }
    }
    println!("{table}");
}

fn side(line: Option<&statehub_common::diff::DiffLine>) -> (String, String) {
    line.map(|l| (l.number.to_string(), l.text.clone()))
        .unwrap_or_default()
}

fn print_unified(hunks: &[Hunk]) {
    for hunk in hunks {
        if hunk.skipped_before > 0 {
            println!("{}", skipped_marker(hunk.skipped_before));
        }
        for row in &hunk.rows {
            for line in unified_lines(row) {
                println!("{}", line);
            }
        }
    }
}

fn unified_lines(row: &DiffRow) -> Vec<String> {
    let text = |l: &Option<statehub_common::diff::DiffLine>| {
        l.as_ref().map(|l| l.text.clone()).unwrap_or_default()
    };
    match row.kind {
        ChangeKind::Equal => vec![format!("  {}", text(&row.left))],
        ChangeKind::Removed => vec![format!("- {}", text(&row.left)).red().to_string()],
        ChangeKind::Added => vec![format!("+ {}", text(&row.right)).green().to_string()],
        ChangeKind::Modified => vec![
            format!("- {}", text(&row.left)).red().to_string(),
            format!("+ {}", text(&row.right)).green().to_string(),
        ],
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Success line accompanying command output. Goes to stderr for structured
/// formats so the body on stdout parses.
pub fn print_status(message: &str, format: OutputFormat) {
    if format.is_structured() {
        eprintln!("{} {}", "✓".green(), message);
    } else {
        print_success(message);
    }
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "!".yellow(), message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{}", message);
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
