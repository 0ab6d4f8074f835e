//! Keeps a local SQLite view of a cycler fleet in sync with the servers
//! running it.
/// Application directory helpers.
pub mod app_dirs;
/// Local and shared TOML configuration.
pub mod config;
/// Tracing subscriber setup.
pub mod logging;
/// Reconciliation loop and daily maintenance schedule.
pub mod orchestrator;
/// Reconciling stored jobs with server reports.
pub mod reconcile;
/// Server transport.
pub mod remote;
/// Job and snapshot status vocabularies.
pub mod status;
/// SQLite state store.
pub mod store;
