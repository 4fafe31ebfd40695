//! Fire-time schedules for time-based rotation

use chrono::{DateTime, Local};
use rollwrite_core::{Error, Result};
use std::str::FromStr;

/// Something that can say when the next rotation should happen
pub trait FireSchedule: Send + 'static {
    /// First fire time strictly after `after`, or `None` if the schedule is exhausted
    fn next_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>>;
}

impl FireSchedule for cron::Schedule {
    fn next_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>> {
        self.after(after).next()
    }
}

/// Parse a cron expression with a leading seconds field, e.g. "0 0 0 * * *"
pub fn parse_schedule(pattern: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(pattern.trim()).map_err(|e| Error::InvalidSchedule {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
