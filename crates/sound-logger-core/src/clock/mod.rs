//! Wall-clock time source for the acquisition pipeline.
//!
//! Every timestamp in the pipeline is derived from one [`TimestampProvider`]
//! so that rows and files stay in a single, monotone local-time frame.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use tracing::debug;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Timezone-aware wall clock with an acquisition-aligned start timestamp.
#[derive(Debug, Clone)]
pub struct TimestampProvider {
    start: DateTime<Local>,
}

impl TimestampProvider {
    /// Creates the provider and pins the start timestamp, truncated to the
    /// whole second. There is one provider per process.
    pub fn new() -> Self {
        let now = Local::now();
        let start = truncate_datetime_to_second(now);
        debug!(start = %start, "Timestamp provider initialized");
        Self { start }
    }

    /// Current timezone-aware timestamp.
    pub fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    /// The acquisition-aligned start timestamp, fixed at construction.
    pub fn start_timestamp(&self) -> DateTime<Local> {
        self.start
    }

    /// Delay needed to sleep until the next integral second.
    pub fn sleep_to_next_second(&self) -> Duration {
        let subsec = u64::from(self.now().timestamp_subsec_nanos());
        Duration::from_nanos(NANOS_PER_SECOND - subsec.min(NANOS_PER_SECOND - 1))
    }
}

impl Default for TimestampProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_datetime_to_second(dt: DateTime<Local>) -> DateTime<Local> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Local wall time truncated to the whole second.
pub fn truncate_to_second(dt: DateTime<Local>) -> NaiveDateTime {
    truncate_datetime_to_second(dt).naive_local()
}

/// Local wall time truncated to the start of its minute.
pub fn truncate_to_minute(dt: DateTime<Local>) -> NaiveDateTime {
    let naive = truncate_to_second(dt);
    naive
        .with_second(0)
        .unwrap_or(naive)
}
