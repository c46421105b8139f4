//! Sync state commands.
//!
//! Diagnostics over the per-resource watermarks, plus the manual reset that
//! forces the next audit of a resource back to FULL mode.

use crate::cli::SyncCommands;
use crate::config::resolve_config;
use crate::error::{Error, Result};
use crate::host::KeyValueStore;
use crate::sync::{SyncState, SyncStateStore, SyncStatus, plan_audit};
use colored::Colorize;
use std::path::PathBuf;

use super::open_workbook;

/// Execute sync commands.
pub fn execute(command: &SyncCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_workbook(db_path)?;
    let store = SyncStateStore::new(&storage);

    match command {
        SyncCommands::Status { service } => status(&store, service.as_deref(), json),
        SyncCommands::History {
            service,
            resource_type,
        } => history(&store, service, resource_type, json),
        SyncCommands::Clear {
            service,
            resource_type,
        } => clear(&store, service, resource_type.as_deref(), json),
        SyncCommands::Mode {
            service,
            resource_type,
            force_full,
        } => mode(&store, service, resource_type, *force_full, json),
    }
}

fn colored_status(status: SyncStatus) -> colored::ColoredString {
    match status {
        SyncStatus::Success => status.to_string().green(),
        SyncStatus::Partial => status.to_string().yellow(),
        SyncStatus::Error => status.to_string().red(),
    }
}

fn print_state(state: &SyncState) {
    let when = state
        .last_sync_timestamp
        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
    println!(
        "  {:<24} {:<12} {:>7} records  {:<11}  {}",
        state.resource_type,
        colored_status(state.last_sync_status),
        state.last_sync_count,
        state.sync_mode.to_string(),
        when.dimmed()
    );
}

fn status<K: KeyValueStore + ?Sized>(
    store: &SyncStateStore<'_, K>,
    service: Option<&str>,
    json: bool,
) -> Result<()> {
    let states = store.get_all_sync_states(service);

    if json {
        println!("{}", serde_json::to_string(&states)?);
        return Ok(());
    }

    if states.is_empty() {
        println!("{}", "No sync state recorded.".dimmed());
        println!(
            "{}",
            "Run 'sa audit run <service> --resources ... --source <dir>' to start.".dimmed()
        );
        return Ok(());
    }

    println!("{}", "Sync Status".bold().underline());
    for (service, resources) in &states {
        println!();
        println!("{}", service.blue().bold());
        for state in resources.values() {
            print_state(state);
        }
    }
    Ok(())
}

fn history<K: KeyValueStore + ?Sized>(
    store: &SyncStateStore<'_, K>,
    service: &str,
    resource_type: &str,
    json: bool,
) -> Result<()> {
    let entries = store.get_sync_history(service, resource_type);

    if json {
        let output = serde_json::json!({
            "service": service.to_uppercase(),
            "resource_type": resource_type.to_uppercase(),
            "count": entries.len(),
            "history": entries,
        });
        println!("{output}");
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sync history for {service}/{resource_type}.");
        return Ok(());
    }

    println!(
        "{}",
        format!("History: {service}/{resource_type}").bold().underline()
    );
    // Most recent first
    for state in entries.iter().rev() {
        print_state(state);
    }
    Ok(())
}

fn clear<K: KeyValueStore + ?Sized>(
    store: &SyncStateStore<'_, K>,
    service: &str,
    resource_type: Option<&str>,
    json: bool,
) -> Result<()> {
    if !store.clear_sync_state(service, resource_type) {
        return Err(Error::Sync(format!(
            "Failed to clear sync state for {service}"
        )));
    }

    if json {
        let output = serde_json::json!({
            "cleared": true,
            "service": service.to_uppercase(),
            "resource_type": resource_type.map(str::to_uppercase),
        });
        println!("{output}");
    } else {
        let scope = resource_type.map_or_else(|| service.to_string(), |r| format!("{service}/{r}"));
        println!("Cleared sync state for {scope}. The next audit will run FULL.");
    }
    Ok(())
}

fn mode<K: KeyValueStore + ?Sized>(
    store: &SyncStateStore<'_, K>,
    service: &str,
    resource_type: &str,
    force_full: bool,
    json: bool,
) -> Result<()> {
    let config = resolve_config()?;
    let plan = plan_audit(store, service, resource_type, force_full, config.incremental_enabled);

    if json {
        let output = serde_json::json!({
            "service": service.to_uppercase(),
            "resource_type": resource_type.to_uppercase(),
            "mode": plan.mode,
            "watermark": plan.watermark,
            "incremental_enabled": config.incremental_enabled,
        });
        println!("{output}");
    } else {
        println!("{service}/{resource_type}: {}", plan.mode.to_string().bold());
        match plan.watermark {
            Some(watermark) => println!("  Watermark: {}", watermark.to_rfc3339()),
            None if !config.incremental_enabled => {
                println!("  {}", "Incremental audits are disabled.".dimmed());
            }
            None => {}
        }
    }
    Ok(())
}
