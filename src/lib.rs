//! taskmaster - personal task manager library
//!
//! This library provides the state and derivation layer behind the `tm`
//! CLI and terminal viewer.
//!
//! # Core Concepts
//!
//! - **Task Store**: the owner's tasks in stored order, updated optimistically
//! - **Filters**: status, category, priority and search term, combined
//! - **Derived View**: filtered list, pagination, dashboard and calendar
//! - **Due-Soon Monitor**: flags incomplete tasks due within a window
//! - **Backends**: where tasks are persisted, behind a capability trait
//!
//! # Module Organization
//!
//! - `task`: Task model, drafts and patches
//! - `store`: Task store with snapshot reconciliation
//! - `filter`: Filter state and filter store
//! - `view`: Pure derivations over tasks and filters
//! - `due_soon`: Due-soon checks, notification set and interval monitor
//! - `reorder`: Drag-style reorder controller
//! - `session`: Task session tying stores to a backend
//! - `backend`: Backend trait with memory and file implementations
//! - `auth`: Identity provider trait, local provider and auth store
//! - `objects`: Object storage for profile photos
//! - `owner`: Owner resolution for commands
//! - `config`: Configuration loading from `taskmaster.toml`
//! - `storage`: Data directory layout and JSON helpers
//! - `lock`: File locking and atomic writes
//! - `cli`: Command-line interface using clap
//! - `ui`: Terminal task viewer

pub mod auth;
pub mod backend;
pub mod cli;
pub mod clock;
pub mod config;
pub mod due_soon;
pub mod error;
pub mod filter;
pub mod lock;
pub mod objects;
pub mod output;
pub mod owner;
pub mod reorder;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod ui;
pub mod view;

pub use error::{Error, Result};
