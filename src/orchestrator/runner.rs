use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, error};

/// How a contained stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed(String),
}

impl StageOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed)
    }
}

/// Run one stage, turning errors and panics into [`StageOutcome::Failed`].
///
/// Nothing escapes: the caller always gets an outcome and carries on.
pub fn run_contained<E, F>(stage: &str, work: F) -> StageOutcome
where
    E: Display,
    F: FnOnce() -> Result<(), E>,
{
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(())) => {
            debug!("Stage {stage} completed");
            StageOutcome::Completed
        }
        Ok(Err(err)) => {
            error!("Stage {stage} failed: {err}");
            debug!("Stage {stage} backtrace:\n{}", Backtrace::force_capture());
            StageOutcome::Failed(err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Stage {stage} panicked: {message}");
            debug!("Stage {stage} backtrace:\n{}", Backtrace::force_capture());
            StageOutcome::Failed(format!("panic: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
