//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Stack Audit CLI - incremental audits and BigQuery alert jobs
#[derive(Parser, Debug)]
#[command(name = "sa", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workbook path (default: ~/.stackaudit/data/stackaudit.db)
    #[arg(long, global = true, env = "SA_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the audit workbook
    Init {
        /// Recreate an existing workbook
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Inspect and reset incremental sync state
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Run audits against exported platform records
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Long-running BigQuery alert jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Inspect managed sheets
    Sheet {
        #[command(subcommand)]
        command: SheetCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Show current sync state per resource
    Status {
        /// Only show this service
        #[arg(long)]
        service: Option<String>,
    },

    /// Show the recent sync history of one resource
    History {
        /// Service (e.g. GA4, GTM)
        service: String,

        /// Resource type (e.g. Properties)
        resource_type: String,
    },

    /// Clear sync state so the next audit runs FULL
    Clear {
        /// Service to clear
        service: String,

        /// Only clear this resource type
        resource_type: Option<String>,
    },

    /// Show which audit mode the next run would use
    Mode {
        service: String,
        resource_type: String,

        /// Pretend a full audit was requested
        #[arg(long)]
        force_full: bool,
    },
}

// ============================================================================
// Audit Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Audit one service across several resource types
    Run(AuditRunArgs),
}

#[derive(clap::Args, Debug)]
pub struct AuditRunArgs {
    /// Service to audit (e.g. GA4)
    pub service: String,

    /// Comma-separated resource types (e.g. "Properties,Data Streams")
    #[arg(long, short = 'r', value_delimiter = ',', required = true)]
    pub resources: Vec<String>,

    /// Directory holding `<service>/<resource_type>.jsonl` exports
    #[arg(long)]
    pub source: PathBuf,

    /// Reconciliation strategy (append, merge, selective, overwrite)
    #[arg(long, default_value = "merge")]
    pub strategy: String,

    /// Zero-based primary key column
    #[arg(long, default_value = "0")]
    pub key_column: usize,

    /// Ignore watermarks and fetch everything
    #[arg(long)]
    pub force_full: bool,
}

// ============================================================================
// Job Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Submit a job and schedule its first status check
    Submit {
        /// Job family (heartbeat, dimensional-health, data-inventory, smart-discovery)
        family: String,

        /// BigQuery project (default: config / SA_BQ_PROJECT)
        #[arg(long)]
        project: Option<String>,

        /// GA4 export dataset (default: config / SA_GA4_DATASET)
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Run one status check for a family
    Check {
        family: String,
    },

    /// Poll a family in the foreground until it finishes
    Watch {
        family: String,

        /// Give up after this many polls and hand back to deferred checks
        #[arg(long)]
        max_polls: Option<usize>,
    },

    /// Run every due deferred check
    Tick,

    /// Clear a family's job handle and pending checks
    Reset {
        family: String,
    },

    /// List jobs in flight and pending checks
    List,
}

// ============================================================================
// Sheet Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SheetCommands {
    /// List managed sheets
    List,

    /// Print a sheet's rows
    Show {
        /// Sheet name
        name: String,

        /// Maximum data rows to print
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}
