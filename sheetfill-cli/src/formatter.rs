//! Output formatters for fill results, sheet lists and template maps

use anyhow::Result;
use colored::*;
use sheetfill_core::{
    CellKind, CellSummary, PatchOutcome, SheetEntry, SheetState, TemplateConfig,
    TemplateRegistry, UpdateStatus,
};
use std::path::Path;

const RULE_WIDTH: usize = 70;
const MAX_VALUE_WIDTH: usize = 45;

/// Print an error and its causes to stderr
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".bright_black(), cause);
    }
}

/// Report of a fill run. Goes to stderr so a base64 payload on stdout stays clean.
pub fn print_fill_summary(template: &Path, outcome: &PatchOutcome, output: Option<&Path>) {
    eprintln!("{}", format!("Filled: {}", template.display()).bold());
    eprintln!("  {} {}", "Sheet part:".bold(), outcome.sheet_path.cyan());

    for (coordinate, status) in &outcome.statuses {
        match status {
            UpdateStatus::Applied => eprintln!("  {} {}", "✓".green(), coordinate),
            UpdateStatus::SkippedFormula => eprintln!(
                "  {} {} {}",
                "SKIP".yellow().bold(),
                coordinate.yellow(),
                "(formula cell left unchanged)".bright_black()
            ),
        }
    }

    if outcome.strings_added > 0 {
        eprintln!("  {} {}", "New shared strings:".bold(), outcome.strings_added);
    }
    if let Some(path) = output {
        eprintln!("{} {}", "Output:".green().bold(), path.display());
    }
}

pub fn print_sheets_human(template: &str, sheets: &[SheetEntry]) {
    println!("{}", format!("Sheets in {}:", template).bold());
    for (i, sheet) in sheets.iter().enumerate() {
        let state = match sheet.state {
            SheetState::Visible => String::new(),
            SheetState::Hidden => format!(" {}", "(hidden)".bright_black()),
            SheetState::VeryHidden => format!(" {}", "(very hidden)".bright_black()),
        };
        println!("  {}. {}{}", i + 1, sheet.name.cyan(), state);
    }
}

pub fn print_sheets_json(template: &str, sheets: &[SheetEntry]) -> Result<()> {
    let output = serde_json::json!({
        "template": template,
        "sheets": sheets,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn truncate(value: &str) -> String {
    if value.chars().count() > MAX_VALUE_WIDTH {
        let head: String = value.chars().take(MAX_VALUE_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

fn kind_label(kind: CellKind) -> ColoredString {
    let label = format!("{:<13}", kind.as_str());
    match kind {
        CellKind::Formula => label.magenta(),
        CellKind::String | CellKind::InlineString => label.green(),
        CellKind::Boolean => label.blue(),
        CellKind::Number => label.yellow(),
    }
}

/// Cell table followed by a registry snippet for the suggested fields
pub fn print_map_human(
    template: &str,
    sheet: &str,
    cells: &[CellSummary],
    suggestion: &TemplateConfig,
) -> Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    println!("{}", rule);
    println!("{} {}", "Template:".bold(), template);
    println!("{} {}", "Sheet:".bold(), sheet.cyan());
    println!("{} {}", "Total cells with values:".bold(), cells.len());
    println!("{}", rule);
    println!();

    println!("{:<14} | {:<13} | {}", "Cell Reference", "Type", "Value");
    println!("{}", "-".repeat(RULE_WIDTH));
    for cell in cells {
        println!(
            "{:<14} | {} | {}",
            cell.reference,
            kind_label(cell.kind),
            truncate(&cell.value)
        );
    }

    println!();
    println!("{}", "Suggested field mapping:".bold().underline());
    if suggestion.fields.is_empty() {
        println!("{}", "  (no text cells to suggest fields from)".bright_black());
    }
    let mut registry = TemplateRegistry::default();
    registry
        .templates
        .insert(template.to_string(), suggestion.clone());
    println!("{}", toml::to_string(&registry)?);
    Ok(())
}

pub fn print_map_json(
    template: &str,
    sheet: &str,
    cells: &[CellSummary],
    suggestion: &TemplateConfig,
) -> Result<()> {
    let output = serde_json::json!({
        "template": template,
        "sheet": sheet,
        "cells": cells,
        "suggested_fields": suggestion.fields,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
