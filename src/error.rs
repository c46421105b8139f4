//! Error types for the Stack Audit CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=job, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stack Audit operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string; shells on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    SheetNotFound,
    JobNotFound,

    // Validation (exit 4)
    InvalidArgument,
    UnknownJobFamily,

    // Job lifecycle (exit 5)
    JobAlreadyRunning,
    JobFailed,

    // Sync (exit 6)
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Query engine (exit 9)
    EngineError,
    AuthError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SheetNotFound => "SHEET_NOT_FOUND",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UnknownJobFamily => "UNKNOWN_JOB_FAMILY",
            Self::JobAlreadyRunning => "JOB_ALREADY_RUNNING",
            Self::JobFailed => "JOB_FAILED",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::EngineError => "ENGINE_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::SheetNotFound | Self::JobNotFound => 3,
            Self::InvalidArgument | Self::UnknownJobFamily => 4,
            Self::JobAlreadyRunning | Self::JobFailed => 5,
            Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::EngineError | Self::AuthError => 9,
        }
    }

    /// Whether a caller should retry (possibly with corrected input).
    ///
    /// True for validation errors, busy databases and transient engine
    /// failures. False for not-found, auth, I/O, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::UnknownJobFamily
                | Self::DatabaseError
                | Self::EngineError
                | Self::JobAlreadyRunning
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Stack Audit operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `sa init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Sheet not found: {name}")]
    SheetNotFound { name: String },

    #[error("No job in flight for family: {family}")]
    JobNotFound { family: String },

    #[error("Unknown job family: {0}")]
    UnknownJobFamily(String),

    #[error("A {family} job is already running (job {job_id})")]
    JobAlreadyRunning { family: String, job_id: String },

    #[error("A {family} job is already being watched by this process")]
    AlreadySupervised { family: String },

    #[error("{family} job {job_id} failed: {message}")]
    JobFailed {
        family: String,
        job_id: String,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query engine error: {0}")]
    Engine(String),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::SheetNotFound { .. } => ErrorCode::SheetNotFound,
            Self::JobNotFound { .. } => ErrorCode::JobNotFound,
            Self::UnknownJobFamily(_) => ErrorCode::UnknownJobFamily,
            Self::JobAlreadyRunning { .. } | Self::AlreadySupervised { .. } => {
                ErrorCode::JobAlreadyRunning
            }
            Self::JobFailed { .. } => ErrorCode::JobFailed,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Sync(_) => ErrorCode::SyncError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Engine(_) => ErrorCode::EngineError,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `sa init` to create the audit workbook".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Workbook already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::SheetNotFound { name } => Some(format!(
                "No sheet named '{name}'. Use `sa sheet list` to see managed sheets."
            )),

            Self::JobNotFound { family } => Some(format!(
                "Submit one first: sa job submit {family}"
            )),

            Self::UnknownJobFamily(_) => Some(
                "Valid families: heartbeat, dimensional-health, data-inventory, smart-discovery"
                    .to_string(),
            ),

            Self::JobAlreadyRunning { family, .. } | Self::AlreadySupervised { family } => Some(format!(
                "Wait for it to finish (sa job watch {family}) or clear it with `sa job reset {family}`."
            )),

            Self::JobFailed { .. } => Some(
                "Check the query and dataset configuration, then resubmit the job.".to_string(),
            ),

            Self::Auth(_) => Some(
                "Reauthorize: export a fresh token in SA_ACCESS_TOKEN \
                 (e.g. `gcloud auth print-access-token`)."
                    .to_string(),
            ),

            Self::Engine(_) => Some("Transient engine failures can be retried.".to_string()),

            Self::Config(_) => Some(
                "Check ~/.stackaudit/config.json and the SA_* environment variables.".to_string(),
            ),

            Self::Sync(_) => Some(
                "Clear the sync state (`sa sync clear <service>`) to force a full audit."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("strategy") {
                    Some("Valid strategies: append, merge, selective, overwrite".to_string())
                } else if msg.contains("status") {
                    Some("Valid statuses: SUCCESS, PARTIAL, ERROR".to_string())
                } else {
                    None
                }
            }

            Self::Database(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_errors_share_exit_code() {
        let running = Error::JobAlreadyRunning {
            family: "heartbeat".into(),
            job_id: "job_1".into(),
        };
        let failed = Error::JobFailed {
            family: "heartbeat".into(),
            job_id: "job_1".into(),
            message: "boom".into(),
        };
        assert_eq!(running.exit_code(), 5);
        assert_eq!(failed.exit_code(), 5);
        assert!(running.error_code().is_retryable());
        assert!(!failed.error_code().is_retryable());
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::Auth("token expired".into());
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "AUTH_ERROR");
        assert_eq!(json["error"]["exit_code"], 9);
        assert!(json["error"]["hint"].as_str().unwrap().contains("SA_ACCESS_TOKEN"));
    }

    #[test]
    fn test_strategy_hint() {
        let err = Error::InvalidArgument("unknown strategy: upsert".into());
        assert!(err.hint().unwrap().contains("selective"));
        assert!(Error::Other("x".into()).hint().is_none());
    }
}
