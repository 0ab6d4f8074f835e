//! Time-driven loop around the reconciler.
//!
//! Two timers share one thread: every `interval` the job state is
//! reconciled, and once a daily anchor has passed the maintenance sequence
//! runs (snapshot, harvest stages, sample analysis, batch analysis). Each
//! step goes through [`run_contained`], so a failing or panicking step is
//! logged and the next one still runs.

use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::store::format_timestamp;

mod clock;
mod runner;
mod schedule;
mod shutdown;
mod stages;


pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{StageOutcome, run_contained};
pub use schedule::{Schedule, ScheduleError, anchor_candidates, next_anchor, parse_anchor};
pub use shutdown::ShutdownSignal;
pub use stages::{
    BatchAnalysisStage, ExternalCommand, HarvestStage, MaintenanceStage, SampleAnalysisStage,
    StageError, stages_from_config,
};

/// Longest single sleep while waiting, so shutdown requests are noticed.
const WAIT_SLICE: Duration = Duration::from_secs(1);

const SNAPSHOT_STAGE: &str = "snapshot";
const RECONCILE_STAGE: &str = "reconcile";

/// Startup failures of the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub reconcile: StageOutcome,
    pub reconcile_report: Option<ReconcileReport>,
    /// Present when the maintenance sequence ran, in execution order.
    pub maintenance: Option<Vec<(String, StageOutcome)>>,
}

impl TickReport {
    pub fn maintenance_ran(&self) -> bool {
        self.maintenance.is_some()
    }

    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.maintenance
            .as_ref()?
            .iter()
            .find(|(stage, _)| stage == name)
            .map(|(_, outcome)| outcome)
    }
}

pub struct Orchestrator<C: Clock> {
    reconciler: Reconciler,
    stages: Vec<Box<dyn MaintenanceStage>>,
    schedule: Schedule,
    clock: C,
    next_run: PrimitiveDateTime,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(reconciler: Reconciler, schedule: Schedule, clock: C) -> Self {
        let next_run = schedule.next_anchor(clock.now());
        Self {
            reconciler,
            stages: Vec::new(),
            schedule,
            clock,
            next_run,
        }
    }

    /// Build the schedule and maintenance stages from the loaded config.
    pub fn from_config(
        config: &DaemonConfig,
        reconciler: Reconciler,
        clock: C,
    ) -> Result<Self, OrchestratorError> {
        let schedule = Schedule::from_config(config)?;
        let stages = stages_from_config(&config.harvesters, &config.analysis)?;
        Ok(Self::new(reconciler, schedule, clock).with_stages(stages))
    }

    /// Stages run after the snapshot, in the given order.
    pub fn with_stages(mut self, stages: Vec<Box<dyn MaintenanceStage>>) -> Self {
        self.stages = stages;
        self
    }

    pub fn next_run(&self) -> PrimitiveDateTime {
        self.next_run
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Reconcile once, then loop until `shutdown` is requested.
    pub fn run(&mut self, shutdown: &ShutdownSignal) {
        info!(
            "Starting loop: every {}s, next maintenance at {}",
            self.schedule.interval.as_secs(),
            format_timestamp(self.next_run)
        );
        self.reconcile_step();
        while !shutdown.is_requested() {
            if !self.wait_interval(shutdown) {
                break;
            }
            self.tick_until(shutdown);
        }
        info!("Shutdown requested, stopping loop");
    }

    /// One loop iteration without waiting: reconcile, and run the
    /// maintenance sequence if its anchor has passed.
    pub fn tick(&mut self) -> TickReport {
        self.tick_until(&ShutdownSignal::new())
    }

    fn tick_until(&mut self, shutdown: &ShutdownSignal) -> TickReport {
        let (reconcile, reconcile_report) = self.reconcile_step();
        let mut report = TickReport {
            reconcile,
            reconcile_report,
            maintenance: None,
        };
        if shutdown.is_requested() || self.clock.now() < self.next_run {
            return report;
        }
        report.maintenance = Some(self.run_maintenance(shutdown));
        self.next_run = self.schedule.next_anchor(self.clock.now());
        info!("Next maintenance at {}", format_timestamp(self.next_run));
        report
    }

    fn reconcile_step(&mut self) -> (StageOutcome, Option<ReconcileReport>) {
        let now = self.clock.now();
        let mut result = None;
        let outcome = run_contained(RECONCILE_STAGE, || {
            result = Some(self.reconciler.reconcile(now));
            Ok::<(), Infallible>(())
        });
        if let Some(report) = &result {
            for label in report.unreachable() {
                warn!("Server {label} skipped this cycle");
            }
        }
        (outcome, result)
    }

    fn run_maintenance(&mut self, shutdown: &ShutdownSignal) -> Vec<(String, StageOutcome)> {
        info!("Running maintenance sequence");
        let mut outcomes = Vec::with_capacity(self.stages.len() + 1);

        let now = self.clock.now();
        let reconciler = &mut self.reconciler;
        let snapshot = run_contained(SNAPSHOT_STAGE, || -> Result<(), StageError> {
            let report = reconciler.snapshot_all(now)?;
            if report.failed.is_empty() {
                Ok(())
            } else {
                Err(StageError::ItemsFailed {
                    stage: SNAPSHOT_STAGE.to_string(),
                    failed: report.failed.len(),
                    total: report.failed.len() + report.taken.len(),
                })
            }
        });
        outcomes.push((SNAPSHOT_STAGE.to_string(), snapshot));

        for stage in &self.stages {
            if shutdown.is_requested() {
                warn!("Maintenance interrupted before {}", stage.name());
                break;
            }
            let store = self.reconciler.store();
            let outcome = run_contained(stage.name(), || stage.run(store));
            outcomes.push((stage.name().to_string(), outcome));
        }
        outcomes
    }

    /// Sleep one interval in slices; `false` if shutdown was requested.
    fn wait_interval(&self, shutdown: &ShutdownSignal) -> bool {
        let mut remaining = self.schedule.interval;
        while !remaining.is_zero() {
            if shutdown.is_requested() {
                return false;
            }
            let slice = remaining.min(WAIT_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
        !shutdown.is_requested()
    }
}
