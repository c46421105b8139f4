//! Stack Audit CLI - incremental platform audits and BigQuery alert jobs
//!
//! This crate provides the core functionality for the `sa` CLI tool.
//!
//! # Architecture
//!
//! - [`host`] - Host service traits (key/value store, sheets, scheduler)
//! - [`storage`] - SQLite implementation of the host services
//! - [`sync`] - Per-resource sync state and audit-mode selection
//! - [`sheets`] - Sheet reconciliation strategies
//! - [`audit`] - Incremental audit runs over fetched records
//! - [`jobs`] - Long-running query job orchestration
//! - [`finalize`] - Severity classification of job results
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod finalize;
pub mod host;
pub mod jobs;
pub mod sheets;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
