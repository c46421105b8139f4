//! Audit run command.

use crate::audit::{AuditRunReport, AuditRunner, JsonlFetcher};
use crate::cli::{AuditCommands, AuditRunArgs};
use crate::config::resolve_config;
use crate::error::{Error, Result};
use crate::sheets::ReconciliationStrategy;
use crate::sync::SyncStatus;
use colored::Colorize;
use std::path::PathBuf;

use super::open_workbook;

/// Execute audit commands.
pub fn execute(command: &AuditCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        AuditCommands::Run(args) => run(args, db_path, json),
    }
}

fn run(args: &AuditRunArgs, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let strategy: ReconciliationStrategy =
        args.strategy.parse().map_err(Error::InvalidArgument)?;
    let resources: Vec<String> = args
        .resources
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if resources.is_empty() {
        return Err(Error::InvalidArgument("at least one resource type is required".to_string()));
    }
    if !args.source.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "source directory not found: {}",
            args.source.display()
        )));
    }

    let config = resolve_config()?;
    let storage = open_workbook(db_path)?;
    let fetcher = JsonlFetcher::new(&args.source);

    let report = AuditRunner::new(&storage, &storage, &fetcher, &config)
        .with_strategy(strategy)
        .with_key_column(args.key_column)
        .with_force_full(args.force_full)
        .run(&args.service, &resources);

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }

    if report.status == SyncStatus::Error {
        return Err(Error::Sync(format!(
            "every resource of {} failed",
            report.service
        )));
    }
    Ok(())
}

fn print_report(report: &AuditRunReport) {
    let status = match report.status {
        SyncStatus::Success => report.status.to_string().green().bold(),
        SyncStatus::Partial => report.status.to_string().yellow().bold(),
        SyncStatus::Error => report.status.to_string().red().bold(),
    };
    println!("Audit {}: {status}", report.service.bold());
    println!();

    for resource in &report.resources {
        match (&resource.update, &resource.error) {
            (_, Some(error)) => {
                println!(
                    "  {} {:<24} {}",
                    "✗".red(),
                    resource.resource_type,
                    error.red()
                );
            }
            (Some(update), None) => {
                println!(
                    "  {} {:<24} {:<11} {} fetched, {} synced, {} written  → {} ({} rows)",
                    "✓".green(),
                    resource.resource_type,
                    resource.mode.to_string(),
                    resource.records_fetched,
                    resource.records_synced,
                    update.rows_written(),
                    resource.sheet_name,
                    update.total_rows_in_sheet
                );
            }
            (None, None) => {}
        }
    }
}
