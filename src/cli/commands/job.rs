//! Job commands.
//!
//! `submit`, `check`, `watch` and `tick` talk to BigQuery and need
//! `SA_ACCESS_TOKEN`. `reset` and `list` only touch the workbook.

use crate::cli::JobCommands;
use crate::config::{AuditConfig, resolve_config};
use crate::error::{Error, Result};
use crate::finalize::AlertFinalizer;
use crate::host::Scheduler;
use crate::jobs::{
    BigQueryClient, JobFamily, JobHandleRepository, JobOrchestrator, JobSupervisor, PollOutcome,
    QueryTarget, build_query, reset_family, run_due_callbacks,
};
use crate::storage::SqliteStorage;
use chrono::Utc;
use colored::Colorize;
use std::path::PathBuf;

use super::open_workbook;

/// Execute job commands.
pub fn execute(command: &JobCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        JobCommands::Submit {
            family,
            project,
            dataset,
        } => submit(
            family.parse()?,
            project.as_deref(),
            dataset.as_deref(),
            db_path,
            json,
        ),
        JobCommands::Check { family } => check(family.parse()?, db_path, json),
        JobCommands::Watch { family, max_polls } => {
            watch(family.parse()?, *max_polls, db_path, json)
        }
        JobCommands::Tick => tick(db_path, json),
        JobCommands::Reset { family } => reset(family.parse()?, db_path, json),
        JobCommands::List => list(db_path, json),
    }
}

fn engine() -> Result<BigQueryClient> {
    BigQueryClient::new()
        .ok_or_else(|| Error::Auth("no access token; set SA_ACCESS_TOKEN".to_string()))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

fn finalizer<'a>(
    storage: &'a SqliteStorage,
    config: &AuditConfig,
) -> AlertFinalizer<'a, SqliteStorage> {
    AlertFinalizer::from_config(storage, config)
}

fn submit(
    family: JobFamily,
    project: Option<&str>,
    dataset: Option<&str>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let config = resolve_config()?;
    let project_id = project
        .map(ToString::to_string)
        .or_else(|| config.bigquery.project_id.clone())
        .ok_or_else(|| {
            Error::Config("no BigQuery project; pass --project or set SA_BQ_PROJECT".to_string())
        })?;
    let dataset = dataset
        .map(ToString::to_string)
        .or_else(|| config.bigquery.ga4_dataset.clone())
        .ok_or_else(|| {
            Error::Config("no GA4 dataset; pass --dataset or set SA_GA4_DATASET".to_string())
        })?;

    let target = QueryTarget {
        project_id: project_id.clone(),
        dataset,
        lookback_days: config.bigquery.lookback_days,
    };
    let sql = build_query(family, &target, &config.audit_rules);

    let storage = open_workbook(db_path)?;
    let engine = engine()?;
    let orchestrator = JobOrchestrator::new(&storage, &storage, &engine)
        .with_poll_interval(config.poll_interval());

    let handle = runtime()?.block_on(orchestrator.submit(family, &project_id, &sql))?;

    if json {
        let output = serde_json::json!({
            "family": family,
            "handle": handle,
            "pollIntervalSecs": config.poll_interval_secs,
        });
        println!("{output}");
    } else {
        println!(
            "Submitted {} job {} in {}",
            family.to_string().bold(),
            handle.job_id.cyan(),
            handle.project_id
        );
        println!(
            "  First check in {}s. Run 'sa job tick' or 'sa job watch {family}'.",
            config.poll_interval_secs
        );
    }
    Ok(())
}

fn check(family: JobFamily, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = resolve_config()?;
    let storage = open_workbook(db_path)?;
    let engine = engine()?;
    let orchestrator = JobOrchestrator::new(&storage, &storage, &engine)
        .with_poll_interval(config.poll_interval());
    let finalizer = finalizer(&storage, &config);

    let job_id = JobHandleRepository::new(&storage)
        .load(family)?
        .map(|h| h.job_id);
    let outcome = runtime()?.block_on(orchestrator.check_status(family, &finalizer));
    report_outcome(family, job_id, &outcome, json)
}

fn watch(
    family: JobFamily,
    max_polls: Option<usize>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let config = resolve_config()?;
    let storage = open_workbook(db_path)?;
    let engine = engine()?;
    let orchestrator = JobOrchestrator::new(&storage, &storage, &engine)
        .with_poll_interval(config.poll_interval());
    let finalizer = finalizer(&storage, &config);

    let job_id = JobHandleRepository::new(&storage)
        .load(family)?
        .map(|h| h.job_id);
    if job_id.is_none() {
        return Err(Error::JobNotFound {
            family: family.to_string(),
        });
    }

    let supervisor = JobSupervisor::new();
    let outcome =
        runtime()?.block_on(supervisor.watch(&orchestrator, family, &finalizer, max_polls))?;
    report_outcome(family, job_id, &outcome, json)
}

fn tick(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = resolve_config()?;
    let storage = open_workbook(db_path)?;
    let engine = engine()?;
    let orchestrator = JobOrchestrator::new(&storage, &storage, &engine)
        .with_poll_interval(config.poll_interval());
    let finalizer = finalizer(&storage, &config);

    let runs =
        runtime()?.block_on(run_due_callbacks(&orchestrator, &storage, &finalizer, Utc::now()))?;

    if json {
        let output = serde_json::json!({
            "count": runs.len(),
            "runs": runs,
        });
        println!("{output}");
        return Ok(());
    }

    if runs.is_empty() {
        println!("{}", "No checks due.".dimmed());
        return Ok(());
    }
    for run in &runs {
        let outcome = match run.outcome.as_str() {
            "completed" => run.outcome.green(),
            "failed" => run.outcome.red(),
            _ => run.outcome.normal(),
        };
        print!("  {:<20} {outcome}", run.family.to_string());
        if let Some(message) = &run.message {
            print!("  {}", message.dimmed());
        }
        println!();
    }
    Ok(())
}

fn reset(family: JobFamily, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_workbook(db_path)?;
    let cleared = reset_family(&storage, &storage, family)?;

    if json {
        let output = serde_json::json!({
            "family": family,
            "cleared": cleared,
        });
        println!("{output}");
    } else if let Some(handle) = cleared {
        println!(
            "Cleared {} job {}. The BigQuery job itself was not cancelled.",
            family.to_string().bold(),
            handle.job_id
        );
    } else {
        println!("No {family} job in flight; pending checks cleared.");
    }
    Ok(())
}

fn list(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_workbook(db_path)?;
    let jobs = JobHandleRepository::new(&storage).list()?;
    let callbacks = storage.list_scheduled_callbacks()?;

    if json {
        let jobs: Vec<_> = jobs
            .iter()
            .map(|(family, handle)| serde_json::json!({ "family": family, "handle": handle }))
            .collect();
        let output = serde_json::json!({
            "jobs": jobs,
            "scheduled": callbacks,
        });
        println!("{output}");
        return Ok(());
    }

    if jobs.is_empty() {
        println!("{}", "No jobs in flight.".dimmed());
    } else {
        println!("{}", "Jobs in flight".bold().underline());
        for (family, handle) in &jobs {
            let since = handle
                .submitted_at
                .map_or_else(String::new, |t| format!("since {}", t.to_rfc3339()));
            println!(
                "  {:<20} {:<32} {:<20} {}",
                family.to_string(),
                handle.job_id.cyan(),
                handle.project_id,
                since.dimmed()
            );
        }
    }

    if !callbacks.is_empty() {
        println!();
        println!("{}", "Scheduled checks".bold().underline());
        for callback in &callbacks {
            println!(
                "  {:<36} {:<32} due {}",
                callback.id.dimmed(),
                callback.function_name,
                callback.due_at.to_rfc3339()
            );
        }
    }
    Ok(())
}

fn report_outcome(
    family: JobFamily,
    job_id: Option<String>,
    outcome: &PollOutcome,
    json: bool,
) -> Result<()> {
    if json {
        let mut output = serde_json::json!({
            "family": family,
            "jobId": job_id,
            "outcome": outcome.label(),
        });
        match outcome {
            PollOutcome::Completed(summary) => output["summary"] = serde_json::to_value(summary)?,
            PollOutcome::Failed { message } => output["message"] = message.clone().into(),
            PollOutcome::NoJob | PollOutcome::Rescheduled => {}
        }
        println!("{output}");
    } else {
        match outcome {
            PollOutcome::NoJob => println!("No {family} job in flight."),
            PollOutcome::Rescheduled => {
                println!("{family} job still running; next check scheduled.");
            }
            PollOutcome::Completed(summary) => {
                println!("{} {}", "✓".green(), summary.message);
                println!(
                    "  {} critical, {} warning, {} ok  → {}",
                    summary.critical.to_string().red(),
                    summary.warning.to_string().yellow(),
                    summary.ok.to_string().green(),
                    summary.sheet_name
                );
            }
            PollOutcome::Failed { .. } => {}
        }
    }

    if let PollOutcome::Failed { message } = outcome {
        return Err(Error::JobFailed {
            family: family.to_string(),
            job_id: job_id.unwrap_or_else(|| "-".to_string()),
            message: message.clone(),
        });
    }
    Ok(())
}
