//! Create or update the fleet database from the configuration.
//!
//! New sample columns are added directly. Columns that disappeared from the
//! config are only dropped after two separate confirmations.

use std::path::PathBuf;

use cycler_sync::config;
use cycler_sync::logging;
use cycler_sync::store::{
    FlagApproval, InteractiveApproval, SchemaApproval, StateStore, load_manual_jobs,
};

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

    println!("DB: {}", config.database_path.display());
    let mut store = StateStore::open(&config.database_path).map_err(|err| err.to_string())?;

    let plan = store
        .plan_schema(&config.sample_columns)
        .map_err(|err| err.to_string())?;
    if plan.is_empty() {
        println!("Sample columns up to date");
    } else {
        for column in &plan.to_add {
            println!("+ {} {}", column.name, column.sql_type);
        }
        for name in &plan.to_remove {
            println!("- {name}");
        }
    }
    if options.dry_run {
        return Ok(());
    }

    let mut flags = FlagApproval {
        allow_column_removal: options.allow_column_removal,
        confirm_data_loss: options.confirm_data_loss,
    };
    let mut prompts = InteractiveApproval::stdio();
    let approval: &mut dyn SchemaApproval = if options.interactive {
        &mut prompts
    } else {
        &mut flags
    };
    let outcome = store
        .sync_schema(&config.sample_columns, approval)
        .map_err(|err| err.to_string())?;
    if !outcome.removal_declined.is_empty() {
        println!(
            "Kept columns (removal not confirmed): {}",
            outcome.removal_declined.join(", ")
        );
    }

    let mut pipelines = 0usize;
    for server in &config.servers {
        for pipeline in &server.pipelines {
            store
                .register_pipeline(pipeline, &server.label, &server.hostname)
                .map_err(|err| err.to_string())?;
            pipelines += 1;
        }
    }
    println!("Pipelines registered: {pipelines}");

    if let Some(path) = &options.manual_jobs {
        let records = load_manual_jobs(path).map_err(|err| err.to_string())?;
        let report = store
            .merge_manual_jobs(&records)
            .map_err(|err| err.to_string())?;
        println!(
            "Manual jobs: {} inserted, {} already present, {} rejected",
            report.inserted.len(),
            report.already_present.len(),
            report.rejected.len()
        );
        for (job_id, reason) in &report.rejected {
            println!("  rejected {job_id}: {reason}");
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliOptions {
    config_path: Option<PathBuf>,
    manual_jobs: Option<PathBuf>,
    dry_run: bool,
    interactive: bool,
    allow_column_removal: bool,
    confirm_data_loss: bool,
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
            "--manual-jobs" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--manual-jobs requires a value".to_string())?;
                options.manual_jobs = Some(PathBuf::from(value));
            }
            "--dry-run" => options.dry_run = true,
            "--interactive" => options.interactive = true,
            "--allow-column-removal" => options.allow_column_removal = true,
            "--confirm-data-loss" => options.confirm_data_loss = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "cycler-sync-db",
        "",
        "Usage:",
        "  cycler-sync-db [--config <path>] [--manual-jobs <jobs.json>] [--dry-run]",
        "                 [--interactive | --allow-column-removal --confirm-data-loss]",
        "",
        "Columns missing from the config are removed only when both",
        "--allow-column-removal and --confirm-data-loss are given, or both",
        "prompts are answered in --interactive mode.",
    ]
    .join("\n")
}
