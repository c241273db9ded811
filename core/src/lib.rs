//! Hierarchical sales target engine.
//!
//! Targets are kept per scope (individual, department, company) and period
//! (month, quarter, year). Monthly rows are the source of truth; quarter and
//! year rows are derived, and a department manager's personal target is
//! derived from the department total and the peers' targets.

pub mod aggregator;
pub mod bulk_update;
pub mod cascade_delete;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod event;
pub mod manager_backfill;
pub mod permission;
pub mod record;
pub mod store;
pub mod types;
pub mod year_copy;
