//! Hierarchical equivalent-level aggregation.
//!
//! Each interval's LAeq derives from the immediately finer table: the
//! one-minute aggregate reads the 1 Hz base rows, every coarser interval
//! reads the one-minute rows, and the daily value reads the hourly rows.
//! At the 24 h boundary the day/evening/night regulatory indicators and the
//! Lden composite follow after a settling grace.

use crate::{
    AppResult,
    scheduler::{Interval, IntervalSubscriber},
    store::{LdenRow, LocalStore},
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use sound_logger_core::{laeq, lden};
use tracing::{error, info, warn};

/// Upstream aggregates settle before the daily indicators read them.
const LDEN_GRACE: Duration = Duration::from_secs(20);

/// Number of sliding six-hour day windows, stepping 30 minutes from 07:00.
const DAY_WINDOWS: usize = 13;

/// Measured day/evening/night levels feeding one Lden variant.
struct DailyIndicators {
    lday: f64,
    timestamp_lday: NaiveDateTime,
    lday_eu: f64,
    levening: f64,
    timestamp_levening: NaiveDateTime,
    levening_eu: f64,
    lnight: f64,
    timestamp_lnight: NaiveDateTime,
    lnight_eu: f64,
}

/// Equivalent-level aggregator for one parameter database.
pub(crate) struct LaeqAggregator {
    db: String,
    store: Arc<LocalStore>,
    daily_indicators: bool,
}

impl LaeqAggregator {
    pub(crate) fn new(db: String, store: Arc<LocalStore>, daily_indicators: bool) -> Self {
        Self {
            db,
            store,
            daily_indicators,
        }
    }

    fn table(&self, interval: Interval) -> String {
        format!("{}{}", self.db, interval.table_suffix())
    }

    /// Writes one aggregate row computed over `[start, end)` of the source
    /// table. Empty or degenerate windows are skipped with a log.
    async fn aggregate_window(
        &self,
        source: &str,
        target: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<()> {
        let values = self.store.fetch_values(&self.db, source, start, end).await?;

        let Some(value) = laeq(&values) else {
            info!(db = %self.db, source, %start, %end, "No value calculated for window");
            return Ok(());
        };

        self.store.ensure_measurement_table(&self.db, target).await?;
        self.store
            .insert_measurement(&self.db, target, start, value)
            .await
    }

    /// Daily chain: Lday, Levening, Lnight and both Lden variants.
    async fn aggregate_lden(&self, day_start: NaiveDateTime) -> AppResult<()> {
        // Grace so the hourly and sub-hourly aggregates for this boundary
        // are already written.
        tokio::time::sleep(LDEN_GRACE).await;

        let day = self.aggregate_lday(day_start).await?;
        let evening = self.aggregate_levening(day_start).await?;
        let night = self.aggregate_lnight(day_start).await?;

        let (Some(day), Some(evening), Some(night)) = (day, evening, night) else {
            error!(db = %self.db, %day_start, "Missing Lden component, skipping write");
            return Ok(());
        };

        let lden_ro = lden(day.0, evening.0, night.0);
        let lden_eu = lden(day.2, evening.2, night.2);

        let row = LdenRow {
            timestamp: day_start,
            lden_ro,
            lden_eu,
            lday_ro: day.0,
            timestamp_lday_ro: day.1,
            lday_eu: day.2,
            levening_ro: evening.0,
            timestamp_levening_ro: evening.1,
            levening_eu: evening.2,
            lnight_ro: night.0,
            timestamp_lnight_ro: night.1,
            lnight_eu: night.2,
        };

        self.store.ensure_lden_table(&self.db, "Lden").await?;
        self.store.insert_lden_row(&self.db, "Lden", &row).await?;

        info!(db = %self.db, lden_ro, lden_eu, "Daily Lden written");

        Ok(())
    }

    /// Lday over `[07:00, 19:00)` hourly rows: the EU value is the plain
    /// LAeq, the RO value the maximum over the 13 sliding six-hour windows.
    async fn aggregate_lday(
        &self,
        day_start: NaiveDateTime,
    ) -> AppResult<Option<(f64, NaiveDateTime, f64)>> {
        let source = self.table(Interval::OneHour);
        let seven = day_start + ChronoDuration::hours(7);

        let mut max_laeq: Option<(f64, NaiveDateTime)> = None;
        for i in 0..DAY_WINDOWS {
            let window_start = seven + ChronoDuration::minutes(30 * i as i64);
            let window_end = window_start + ChronoDuration::hours(6);

            let values = self
                .store
                .fetch_values(&self.db, &source, window_start, window_end)
                .await?;
            if let Some(value) = laeq(&values) {
                if max_laeq.is_none_or(|(best, _)| value > best) {
                    max_laeq = Some((value, window_start));
                }
            }
        }

        let full_day = self
            .store
            .fetch_values(&self.db, &source, seven, day_start + ChronoDuration::hours(19))
            .await?;
        let lday_eu = laeq(&full_day);

        match (max_laeq, lday_eu) {
            (Some((lday, at)), Some(eu)) => Ok(Some((lday, at, eu))),
            _ => {
                warn!(db = %self.db, "No valid Lday values for any window");
                Ok(None)
            }
        }
    }

    /// Levening over the 15-minute rows of `[19:00, 23:00)`: maximum single
    /// value with its timestamp, plus the LAeq of the whole range.
    async fn aggregate_levening(
        &self,
        day_start: NaiveDateTime,
    ) -> AppResult<Option<(f64, NaiveDateTime, f64)>> {
        let source = self.table(Interval::FifteenMinutes);
        let start = day_start + ChronoDuration::hours(19);
        let end = day_start + ChronoDuration::hours(23);

        self.range_maximum_and_mean(&source, start, end, "Levening")
            .await
    }

    /// Lnight over the 30-minute rows spanning `[23:00 yesterday, 07:00)`.
    async fn aggregate_lnight(
        &self,
        day_start: NaiveDateTime,
    ) -> AppResult<Option<(f64, NaiveDateTime, f64)>> {
        let source = self.table(Interval::ThirtyMinutes);
        let start = day_start - ChronoDuration::hours(1);
        let end = day_start + ChronoDuration::hours(7);

        self.range_maximum_and_mean(&source, start, end, "Lnight")
            .await
    }

    async fn range_maximum_and_mean(
        &self,
        source: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        indicator: &str,
    ) -> AppResult<Option<(f64, NaiveDateTime, f64)>> {
        let rows = self
            .store
            .fetch_values_with_ts(&self.db, source, start, end)
            .await?;

        let maximum = rows
            .iter()
            .copied()
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let values: Vec<f64> = rows.iter().map(|(v, _)| *v).collect();
        let mean = laeq(&values);

        match (maximum, mean) {
            (Some((level, at)), Some(mean)) => Ok(Some((level, at, mean))),
            _ => {
                warn!(db = %self.db, indicator, "No valid values in range");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl IntervalSubscriber for LaeqAggregator {
    fn name(&self) -> &'static str {
        "laeq-aggregator"
    }

    async fn on_interval(
        &self,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<()> {
        match interval {
            Interval::TwentyFourHours => {
                let source = self.table(Interval::OneHour);
                let target = self.table(Interval::TwentyFourHours);
                self.aggregate_window(&source, &target, start, end).await?;

                if self.daily_indicators {
                    self.aggregate_lden(start).await?;
                }
                Ok(())
            }
            Interval::OneMinute => {
                let target = self.table(Interval::OneMinute);
                self.aggregate_window(&self.db, &target, start, end).await
            }
            other => {
                let source = self.table(Interval::OneMinute);
                let target = self.table(other);
                self.aggregate_window(&source, &target, start, end).await
            }
        }
    }
}
