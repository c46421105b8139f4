//! Job orchestration types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::finalize::FinalizeSummary;
use crate::host::Row;

/// A named category of long-running analytical query.
///
/// Each family owns its handle keys, its status-check callback name and
/// its destination sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobFamily {
    /// Daily event volume anomaly detection.
    Heartbeat,
    /// Event parameter fill-rate checks against audit rules.
    DimensionalHealth,
    /// Dataset and table inventory.
    DataInventory,
    /// Parameter discovery for rule suggestions.
    SmartDiscovery,
}

impl JobFamily {
    pub const ALL: [Self; 4] = [
        Self::Heartbeat,
        Self::DimensionalHealth,
        Self::DataInventory,
        Self::SmartDiscovery,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::DimensionalHealth => "dimensional-health",
            Self::DataInventory => "data-inventory",
            Self::SmartDiscovery => "smart-discovery",
        }
    }

    /// Prefix of this family's handle keys in the key/value store.
    #[must_use]
    pub const fn key_prefix(&self) -> &'static str {
        match self {
            Self::Heartbeat => "HEARTBEAT",
            Self::DimensionalHealth => "DIMENSIONAL_HEALTH",
            Self::DataInventory => "DATA_INVENTORY",
            Self::SmartDiscovery => "SMART_DISCOVERY",
        }
    }

    /// Name of the deferred callback that polls this family's job.
    #[must_use]
    pub const fn check_function_name(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat.check_status",
            Self::DimensionalHealth => "dimensional-health.check_status",
            Self::DataInventory => "data-inventory.check_status",
            Self::SmartDiscovery => "smart-discovery.check_status",
        }
    }

    /// Resolve a deferred callback name back to its family.
    #[must_use]
    pub fn from_check_function(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.check_function_name() == name)
    }

    /// Destination sheet for finalized results.
    #[must_use]
    pub const fn sheet_name(&self) -> &'static str {
        match self {
            Self::Heartbeat => "Heartbeat Alerts",
            Self::DimensionalHealth => "Dimensional Health",
            Self::DataInventory => "Data Inventory",
            Self::SmartDiscovery => "Smart Discovery",
        }
    }

    /// Header row of the destination sheet.
    #[must_use]
    pub fn headers(&self) -> Vec<String> {
        let headers: &[&str] = match self {
            Self::Heartbeat => &[
                "Event Name",
                "Yesterday",
                "7-Day Avg",
                "Deviation %",
                "Severity",
                "Checked At",
            ],
            Self::DimensionalHealth => &[
                "Event Name",
                "Parameter",
                "Total Events",
                "Filled Events",
                "Fill Rate %",
                "Min Fill Rate %",
                "Severity",
                "Checked At",
            ],
            Self::DataInventory => &[
                "Dataset",
                "Table",
                "Rows",
                "Size (MB)",
                "Last Modified",
                "Severity",
                "Checked At",
            ],
            Self::SmartDiscovery => &[
                "Event Name",
                "Parameter",
                "Occurrences",
                "Covered By Rule",
                "Severity",
                "Checked At",
            ],
        };
        headers.iter().map(|h| (*h).to_string()).collect()
    }
}

impl std::fmt::Display for JobFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "heartbeat" => Ok(Self::Heartbeat),
            "dimensional-health" | "health" => Ok(Self::DimensionalHealth),
            "data-inventory" | "inventory" => Ok(Self::DataInventory),
            "smart-discovery" | "discovery" => Ok(Self::SmartDiscovery),
            _ => Err(Error::UnknownJobFamily(s.to_string())),
        }
    }
}

/// Reference to a submitted engine job, persisted until the job is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Engine-reported job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    /// Anything the engine reports that we do not recognize.
    Unknown(String),
}

impl JobState {
    /// Parse an engine state string (`PENDING`, `RUNNING`, `DONE`).
    #[must_use]
    pub fn parse(state: &str) -> Self {
        match state.trim().to_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "DONE" => Self::Done,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether the engine is still working on the job.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Status of an engine job as returned by a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Error payload, only meaningful with `JobState::Done`.
    pub error_result: Option<String>,
}

impl JobStatus {
    #[must_use]
    pub const fn running() -> Self {
        Self {
            state: JobState::Running,
            error_result: None,
        }
    }

    #[must_use]
    pub const fn done() -> Self {
        Self {
            state: JobState::Done,
            error_result: None,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: JobState::Done,
            error_result: Some(message.into()),
        }
    }
}

/// Tabular result set of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResults {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResults {
    /// Position of a named column, case-insensitive.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Outcome of one status-check step.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No handle persisted for the family; nothing was polled.
    NoJob,
    /// Job still in flight; another check is due.
    Rescheduled,
    /// Terminal failure. The handle and schedules were cleared.
    Failed { message: String },
    /// Results were finalized. The handle and schedules were cleared.
    Completed(FinalizeSummary),
}

impl PollOutcome {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Completed(_))
    }

    /// Short label for logs and JSON output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoJob => "no_job",
            Self::Rescheduled => "rescheduled",
            Self::Failed { .. } => "failed",
            Self::Completed(_) => "completed",
        }
    }
}
