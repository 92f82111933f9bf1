//! tasks - plain-text task tracking library
//!
//! This library provides the core functionality for the tasks CLI: a
//! markup codec for task lines, locked line logs per organization, id
//! allocation, and filtering/summary queries.
//!
//! # Core Concepts
//!
//! - **Task line**: `12 - [x] - text +tag #project @high @completed(2024-05-02)`
//! - **Organization**: a directory with `current`, `archived` and `deleted` logs
//!   plus a `taskid` counter
//! - **Active organization**: named by the `org` pointer file in the root
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `config.toml`
//! - `error`: Error types and result aliases
//! - `markup`: Parsing and rendering of task lines
//! - `task`: Task records, priorities and states
//! - `lock`: File locking and atomic writes
//! - `storage`: The three line logs of an organization
//! - `id`: Task id counter
//! - `org`: Organizations and the active pointer
//! - `query`: Filters, summaries and the standup view
//! - `manager`: Task operations used by the CLI
//! - `output`: Human and JSON output

pub mod cli;
pub mod config;
pub mod error;
pub mod id;
pub mod lock;
pub mod manager;
pub mod markup;
pub mod org;
pub mod output;
pub mod query;
pub mod storage;
pub mod task;

pub use error::{Error, Result};
