use std::time::Duration;

use thiserror::Error;
use time::{PrimitiveDateTime, Time};

use crate::config::{DEFAULT_SNAPSHOT_TIME, DaemonConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid snapshot time {0:?}, expected HH:MM")]
    InvalidAnchor(String),
}

/// Fast interval plus the daily anchor times of the maintenance sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub anchors: Vec<Time>,
}

impl Schedule {
    pub fn new(interval: Duration, anchors: Vec<Time>) -> Self {
        let anchors = if anchors.is_empty() {
            vec![default_anchor()]
        } else {
            anchors
        };
        Self { interval, anchors }
    }

    pub fn from_config(config: &DaemonConfig) -> Result<Self, ScheduleError> {
        let anchors = config
            .snapshot_times
            .iter()
            .map(|value| parse_anchor(value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            Duration::from_secs(config.update_interval_seconds),
            anchors,
        ))
    }

    /// Earliest anchor strictly after `now`.
    pub fn next_anchor(&self, now: PrimitiveDateTime) -> PrimitiveDateTime {
        next_anchor(now, &self.anchors).unwrap_or_else(|| default_anchor_after(now))
    }
}

/// Parse a 24-hour `HH:MM` anchor.
pub fn parse_anchor(value: &str) -> Result<Time, ScheduleError> {
    let invalid = || ScheduleError::InvalidAnchor(value.to_string());
    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    let field = |part: &str| -> Result<u8, ScheduleError> {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        part.parse().map_err(|_| invalid())
    };
    Time::from_hms(field(hour)?, field(minute)?, 0).map_err(|_| invalid())
}

/// One candidate per anchor on `now`'s day, moved to the next day unless
/// strictly in the future.
pub fn anchor_candidates(now: PrimitiveDateTime, anchors: &[Time]) -> Vec<PrimitiveDateTime> {
    anchors
        .iter()
        .map(|anchor| {
            let candidate = now.date().with_time(*anchor);
            if candidate > now {
                candidate
            } else {
                candidate + time::Duration::DAY
            }
        })
        .collect()
}

pub fn next_anchor(now: PrimitiveDateTime, anchors: &[Time]) -> Option<PrimitiveDateTime> {
    anchor_candidates(now, anchors).into_iter().min()
}

fn default_anchor() -> Time {
    parse_anchor(DEFAULT_SNAPSHOT_TIME).unwrap_or(Time::MIDNIGHT)
}

fn default_anchor_after(now: PrimitiveDateTime) -> PrimitiveDateTime {
    anchor_candidates(now, &[default_anchor()])
        .into_iter()
        .next()
        .unwrap_or(now)
}
