use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{AnalysisConfig, HarvesterConfig};
use crate::store::{StateStore, StoreError};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Empty command configured for {0}")]
    EmptyCommand(String),
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{failed} of {total} items failed in {stage}")]
    ItemsFailed {
        stage: String,
        failed: usize,
        total: usize,
    },
}

/// One step of the daily maintenance sequence.
pub trait MaintenanceStage {
    fn name(&self) -> &str;

    fn run(&self, store: &StateStore) -> Result<(), StageError>;
}

/// External program plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn from_argv(owner: &str, argv: &[String]) -> Result<Self, StageError> {
        let (program, args) = argv
            .split_first()
            .filter(|(program, _)| !program.trim().is_empty())
            .ok_or_else(|| StageError::EmptyCommand(owner.to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Run to completion, appending `item` as last argument when given.
    pub fn run(&self, item: Option<&str>) -> Result<(), StageError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(item) = item {
            cmd.arg(item);
        }
        let status = cmd.status().map_err(|source| StageError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(StageError::Exit {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }
}

/// Converts raw instrument output of one family into the shared format.
pub struct HarvestStage {
    name: String,
    command: ExternalCommand,
}

impl HarvestStage {
    pub fn from_config(harvester: &HarvesterConfig) -> Result<Self, StageError> {
        let name = format!("harvest {}", harvester.family);
        let command = ExternalCommand::from_argv(&name, &harvester.command)?;
        Ok(Self { name, command })
    }
}

impl MaintenanceStage for HarvestStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _store: &StateStore) -> Result<(), StageError> {
        self.command.run(None)
    }
}

/// Runs the analysis command once per sample that has jobs.
pub struct SampleAnalysisStage {
    command: ExternalCommand,
}

impl SampleAnalysisStage {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl MaintenanceStage for SampleAnalysisStage {
    fn name(&self) -> &str {
        "analyse samples"
    }

    fn run(&self, store: &StateStore) -> Result<(), StageError> {
        let samples = store.sample_ids_with_jobs()?;
        run_per_item(self.name(), &self.command, &samples)
    }
}

/// Runs the batch analysis command once per run ID.
pub struct BatchAnalysisStage {
    command: ExternalCommand,
}

impl BatchAnalysisStage {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl MaintenanceStage for BatchAnalysisStage {
    fn name(&self) -> &str {
        "analyse batches"
    }

    fn run(&self, store: &StateStore) -> Result<(), StageError> {
        let runs = store.run_ids()?;
        run_per_item(self.name(), &self.command, &runs)
    }
}

fn run_per_item(stage: &str, command: &ExternalCommand, items: &[String]) -> Result<(), StageError> {
    let failed = items
        .iter()
        .filter(|item| match command.run(Some(item)) {
            Ok(()) => false,
            Err(err) => {
                warn!("{stage}: {item} failed: {err}");
                true
            }
        })
        .count();
    info!("{stage}: {} of {} items done", items.len() - failed, items.len());
    if failed > 0 {
        return Err(StageError::ItemsFailed {
            stage: stage.to_string(),
            failed,
            total: items.len(),
        });
    }
    Ok(())
}

/// Harvest stages in configured order, then sample and batch analysis.
pub fn stages_from_config(
    harvesters: &[HarvesterConfig],
    analysis: &AnalysisConfig,
) -> Result<Vec<Box<dyn MaintenanceStage>>, StageError> {
    let mut stages: Vec<Box<dyn MaintenanceStage>> = Vec::new();
    for harvester in harvesters {
        stages.push(Box::new(HarvestStage::from_config(harvester)?));
    }
    if let Some(argv) = &analysis.sample_command {
        let command = ExternalCommand::from_argv("analyse samples", argv)?;
        stages.push(Box::new(SampleAnalysisStage::new(command)));
    }
    if let Some(argv) = &analysis.batch_command {
        let command = ExternalCommand::from_argv("analyse batches", argv)?;
        stages.push(Box::new(BatchAnalysisStage::new(command)));
    }
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            ExternalCommand::from_argv("harvest neware", &[]),
            Err(StageError::EmptyCommand(owner)) if owner == "harvest neware"
        ));
        assert!(ExternalCommand::from_argv("x", &argv(&["  "])).is_err());
    }

    #[test]
    fn stages_follow_configured_order() {
        let harvesters = vec![
            HarvesterConfig {
                family: "neware".into(),
                command: argv(&["harvest-neware"]),
            },
            HarvesterConfig {
                family: "eclab".into(),
                command: argv(&["harvest-eclab", "--all"]),
            },
        ];
        let analysis = AnalysisConfig {
            sample_command: Some(argv(&["analyse-sample"])),
            batch_command: Some(argv(&["analyse-batch"])),
        };
        let stages = stages_from_config(&harvesters, &analysis).unwrap();
        let names: Vec<&str> = stages.iter().map(|stage| stage.name()).collect();
        assert_eq!(
            names,
            vec![
                "harvest neware",
                "harvest eclab",
                "analyse samples",
                "analyse batches"
            ]
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let command =
            ExternalCommand::from_argv("x", &argv(&["cycler-sync-no-such-program"])).unwrap();
        assert!(matches!(command.run(None), Err(StageError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn per_item_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("seen.log");
        let script = format!(
            "echo \"$0\" >> '{}'; test \"$0\" != bad",
            log.display()
        );
        let command = ExternalCommand::from_argv("x", &argv(&["sh", "-c", &script])).unwrap();
        let items = argv(&["s1", "bad", "s3"]);

        let err = run_per_item("analyse samples", &command, &items).unwrap_err();

        assert!(matches!(err, StageError::ItemsFailed { failed: 1, total: 3, .. }));
        let seen = std::fs::read_to_string(&log).unwrap();
        assert_eq!(seen.lines().collect::<Vec<_>>(), vec!["s1", "bad", "s3"]);
    }
}
