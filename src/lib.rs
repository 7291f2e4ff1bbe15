//! # Ganger
//!
//! Runs groups of work items under a bounded, cancellable concurrency
//! policy: groups run in parallel up to a limit, items within a group run
//! one at a time, and groups that cannot share the process are pushed into
//! a sequential phase after the parallel one.
//!
//! ## Usage
//!
//! ```bash
//! ganger run plan.yml [--max-concurrent N] [--strategy aggressive] [--no-parallel]
//! ```
//!
//! ## Modules
//!
//! - `cancel` - Shared cooperative cancellation signal
//! - `diagnostics` - Non-fatal failure reporting with pluggable sinks
//! - `error` - Crate-wide error type
//! - `options` - Execution policy resolution (limits, strategy, orderers)
//! - `ordering` - Pluggable group/item ordering extensions and their loader
//! - `plan` - Plan files and shell-backed work items
//! - `scheduler` - Partitioning, admission control, and the two-phase run
//! - `summary` - Mergeable run counters
//! - `work` - Work items and work groups
pub mod cancel;
pub mod diagnostics;
pub mod error;
pub mod options;
pub mod ordering;
pub mod plan;
pub mod scheduler;
pub mod summary;
pub mod work;
