//! Daemon keeping the fleet database in sync with the cycler servers.

use std::path::PathBuf;

use cycler_sync::config::{self, DaemonConfig};
use cycler_sync::logging;
use cycler_sync::orchestrator::{Orchestrator, ShutdownSignal, SystemClock};
use cycler_sync::reconcile::Reconciler;
use cycler_sync::remote::{RemoteServer, SshServer};
use cycler_sync::store::{DenyRemoval, StateStore};
use tracing::{info, warn};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let config = match &options.config_path {
        Some(path) => config::load(path),
        None => config::load_default(),
    }
    .map_err(|err| err.to_string())?;

    if let Err(err) = logging::init(config.save_log) {
        eprintln!("Logging disabled: {err}");
    }
    info!(
        "Loaded config from {}",
        config.local_config_path.display()
    );

    let reconciler = build_reconciler(&config)?;
    let mut orchestrator = Orchestrator::from_config(&config, reconciler, SystemClock)
        .map_err(|err| err.to_string())?;
    let shutdown = ShutdownSignal::install();
    orchestrator.run(&shutdown);
    Ok(())
}

fn build_reconciler(config: &DaemonConfig) -> Result<Reconciler, String> {
    let mut store = StateStore::open(&config.database_path).map_err(|err| err.to_string())?;
    if !config.sample_columns.is_empty() {
        let outcome = store
            .sync_schema(&config.sample_columns, &mut DenyRemoval)
            .map_err(|err| err.to_string())?;
        if !outcome.removal_declined.is_empty() {
            warn!(
                "Run cycler-sync-db to remove columns no longer configured: {}",
                outcome.removal_declined.join(", ")
            );
        }
    }
    let servers: Vec<Box<dyn RemoteServer>> = config
        .servers
        .iter()
        .map(|server| {
            Box::new(SshServer::from_config(
                server,
                config.ssh_private_key_path.as_deref(),
            )) as Box<dyn RemoteServer>
        })
        .collect();
    let reconciler = Reconciler::new(store, servers)
        .with_snapshots_folder(config.snapshots_folder_path.clone());
    reconciler
        .register_servers(&config.servers)
        .map_err(|err| err.to_string())?;
    Ok(reconciler)
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "cycler-sync",
        "",
        "Usage:",
        "  cycler-sync [--config <path-to-config.toml>]",
        "",
        "Without --config the local config in the app directory is used.",
    ]
    .join("\n")
}
