//! Terminal output for the proptree CLI.
//!
//! Human output uses colored status markers and tables; JSON output is meant
//! for scripting and prints the raw serialised value.

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::style;
use proptree_core::DisplayItem;
use serde::Serialize;
use std::fmt::Display;

use crate::console::PairedWrite;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored tables and markers
    Human,
    /// JSON for scripting
    Json,
    /// Plain text without colors
    Plain,
}

pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn warning(msg: impl Display) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

pub fn info(msg: impl Display) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a serialisable value as pretty JSON
pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a list of names (versions or groups).
pub fn names(title: &str, names: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => json(names)?,
        OutputFormat::Plain => {
            for name in names {
                println!("{}", name);
            }
        }
        OutputFormat::Human => {
            if names.is_empty() {
                info(format!("No {} found", title));
            } else {
                println!("{}", style(title).bold().underlined());
                for name in names {
                    println!("  {}", style(name).cyan());
                }
            }
        }
    }
    Ok(())
}

/// Build the item table shown by `show`.
pub fn items_table(items: &[DisplayItem]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Key", "Value", "Comment"]
                .into_iter()
                .map(|h| Cell::new(h).fg(Color::Cyan)),
        );

    for item in items {
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(&item.value),
            Cell::new(item.comment.as_deref().unwrap_or_default()).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Print the items of a group.
pub fn items(items: &[DisplayItem], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => json(items)?,
        OutputFormat::Plain => {
            for item in items {
                match item.comment.as_deref() {
                    Some(comment) => println!("{}={}\t# {}", item.name, item.value, comment),
                    None => println!("{}={}", item.name, item.value),
                }
            }
        }
        OutputFormat::Human => {
            if items.is_empty() {
                info("Group is empty");
            } else {
                println!("{}", items_table(items));
            }
        }
    }
    Ok(())
}

/// Report a paired value/comment write.
pub fn paired_write(action: &str, target: &str, outcome: PairedWrite, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(&outcome);
    }

    match (outcome.value, outcome.comment) {
        (true, true) => success(format!("{} {}", action, target)),
        (true, false) => warning(format!("{} {} but its comment was not written", action, target)),
        (false, true) => warning(format!("Comment of {} written but its value was not", target)),
        (false, false) => error(format!("Could not {} {}", action.to_lowercase(), target)),
    }
    Ok(())
}
