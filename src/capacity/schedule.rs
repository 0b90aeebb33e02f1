use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};

use crate::config::CapacityConfig;
use crate::error::Result;

/// Fires once a day at a wall-clock time in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    run_at: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(run_at: NaiveTime, offset: FixedOffset) -> Self {
        Self { run_at, offset }
    }

    pub fn from_config(config: &CapacityConfig) -> Result<Self> {
        Ok(Self::new(config.run_at()?, config.utc_offset()?))
    }

    /// First run strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset).naive_local();
        let mut next = local.date().and_time(self.run_at);
        if next <= local {
            next += TimeDelta::days(1);
        }
        // A fixed offset has no gaps or folds.
        (next - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_run_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
