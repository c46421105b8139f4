//! Sheet inspection commands.

use crate::cli::SheetCommands;
use crate::error::{Error, Result};
use crate::host::{Cell, SheetStore};
use crate::storage::SqliteStorage;
use colored::Colorize;
use std::path::PathBuf;

use super::open_workbook;

/// Execute sheet commands.
pub fn execute(command: &SheetCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_workbook(db_path)?;

    match command {
        SheetCommands::List => list(&storage, json),
        SheetCommands::Show { name, limit } => show(&storage, name, *limit, json),
    }
}

fn list(storage: &SqliteStorage, json: bool) -> Result<()> {
    let mut sheets = Vec::new();
    for name in storage.list_sheets()? {
        // Row 1 is the header
        let rows = storage.get_last_row(&name)?.saturating_sub(1);
        sheets.push((name, rows));
    }

    if json {
        let sheets: Vec<_> = sheets
            .iter()
            .map(|(name, rows)| serde_json::json!({ "name": name, "rows": rows }))
            .collect();
        println!("{}", serde_json::json!({ "count": sheets.len(), "sheets": sheets }));
        return Ok(());
    }

    if sheets.is_empty() {
        println!("{}", "No sheets yet.".dimmed());
        return Ok(());
    }
    for (name, rows) in &sheets {
        println!("  {:<32} {rows:>7} rows", name.bold());
    }
    Ok(())
}

fn show(storage: &SqliteStorage, name: &str, limit: usize, json: bool) -> Result<()> {
    if !storage.sheet_exists(name)? {
        return Err(Error::SheetNotFound {
            name: name.to_string(),
        });
    }

    let mut rows = storage.read_range(name)?.into_iter();
    let headers = rows.next().unwrap_or_default();
    let data: Vec<_> = rows.collect();
    let total = data.len();
    let shown = &data[..total.min(limit)];

    if json {
        let output = serde_json::json!({
            "name": name,
            "headers": headers,
            "total": total,
            "rows": shown,
        });
        println!("{output}");
        return Ok(());
    }

    println!("{}", name.bold().underline());
    println!("{}", render_row(&headers).bold());
    for row in shown {
        println!("{}", render_row(row));
    }
    if total > shown.len() {
        println!(
            "{}",
            format!("... {} more rows (use --limit)", total - shown.len()).dimmed()
        );
    }
    Ok(())
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_row(row: &[Cell]) -> String {
    row.iter().map(render_cell).collect::<Vec<_>>().join(" | ")
}
