//! Daily expanded uncertainty per ISO 1996-2 Annex G.
//!
//! Runs once per 24 h boundary, after the Lden row exists. Each indicator
//! partitions its period into four groups; the group levels come from the
//! matching aggregate table and the residual background from the raw
//! fast-level samples over the same window.

use crate::{
    AppResult,
    scheduler::{Interval, IntervalSubscriber},
    store::LocalStore,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use sound_logger_core::{
    GroupUncertainty, IntervalUncertainty, group_uncertainty, interval_uncertainty,
    lden_uncertainty,
};
use tracing::{error, info, warn};

/// The Lden writer itself waits 20s; this grace keeps the ordering.
const UNCERTAINTY_GRACE: Duration = Duration::from_secs(25);

/// Background samples come from the raw fast-level base table.
const BACKGROUND_DB: &str = "LAF";
const BACKGROUND_TABLE: &str = "LAF";

const GROUPS_PER_INTERVAL: usize = 4;

/// Annex G uncertainty aggregator for the A-weighted indicator database.
pub(crate) struct UncertaintyAggregator {
    db: String,
    store: Arc<LocalStore>,
}

impl UncertaintyAggregator {
    pub(crate) fn new(db: String, store: Arc<LocalStore>) -> Self {
        Self { db, store }
    }

    /// Group results over four windows of one source table, or `None` when
    /// any group is missing or degenerate.
    async fn compute_groups(
        &self,
        source: &str,
        windows: &[(NaiveDateTime, NaiveDateTime)],
        indicator: &str,
    ) -> AppResult<Option<Vec<GroupUncertainty>>> {
        let mut groups = Vec::with_capacity(windows.len());

        for (start, end) in windows {
            let values = self
                .store
                .fetch_values(&self.db, source, *start, *end)
                .await?;
            let background = self
                .store
                .fetch_values(BACKGROUND_DB, BACKGROUND_TABLE, *start, *end)
                .await?;

            match group_uncertainty(&values, &background) {
                Some(group) => groups.push(group),
                None => {
                    warn!(indicator, %start, %end, "Missing data in group, aborting");
                    return Ok(None);
                }
            }
        }

        Ok(Some(groups))
    }

    async fn indicator_uncertainty(
        &self,
        source: &str,
        windows: &[(NaiveDateTime, NaiveDateTime)],
        indicator_db_value: f64,
        indicator: &str,
    ) -> AppResult<Option<IntervalUncertainty>> {
        let Some(groups) = self.compute_groups(source, windows, indicator).await? else {
            return Ok(None);
        };
        if groups.len() < GROUPS_PER_INTERVAL {
            warn!(indicator, "Not all 4 groups available, aborting");
            return Ok(None);
        }

        let result = interval_uncertainty(&groups, indicator_db_value);
        if let Some(result) = result {
            info!(
                indicator,
                reference = result.reference_db,
                expanded = result.expanded,
                "Indicator uncertainty computed"
            );
        }
        Ok(result)
    }
}

/// Day groups: three-hour windows on the hourly table.
fn day_windows(day_start: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let spans: [(i64, i64); 4] = [(7, 10), (10, 13), (13, 16), (16, 19)];
    spans
        .iter()
        .map(|&(from, to)| {
            (
                day_start + ChronoDuration::hours(from),
                day_start + ChronoDuration::hours(to),
            )
        })
        .collect()
}

/// Evening groups: one-hour windows on the 15-minute table.
fn evening_windows(day_start: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let spans: [(i64, i64); 4] = [(19, 20), (20, 21), (21, 22), (22, 23)];
    spans
        .iter()
        .map(|&(from, to)| {
            (
                day_start + ChronoDuration::hours(from),
                day_start + ChronoDuration::hours(to),
            )
        })
        .collect()
}

/// Night groups: two-hour windows on the 30-minute table, the first
/// spanning midnight into the measured day.
fn night_windows(day_start: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let spans: [(i64, i64); 4] = [(-1, 1), (1, 3), (3, 5), (5, 7)];
    spans
        .iter()
        .map(|&(from, to)| {
            (
                day_start + ChronoDuration::hours(from),
                day_start + ChronoDuration::hours(to),
            )
        })
        .collect()
}

#[async_trait]
impl IntervalSubscriber for UncertaintyAggregator {
    fn name(&self) -> &'static str {
        "uncertainty-aggregator"
    }

    async fn on_interval(
        &self,
        _interval: Interval,
        start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> AppResult<()> {
        // Safety wait so the Lden row for this boundary is populated.
        tokio::time::sleep(UNCERTAINTY_GRACE).await;

        let components = self
            .store
            .fetch_lden_components(&self.db, "Lden", start)
            .await?;

        let Some((lday_eu, levening_eu, lnight_eu)) = components else {
            error!(db = %self.db, %start, "Missing Lden components, aborting uncertainty");
            return Ok(());
        };

        let hourly = format!("{}1h", self.db);
        let quarter = format!("{}15min", self.db);
        let half = format!("{}30min", self.db);

        let day = self
            .indicator_uncertainty(&hourly, &day_windows(start), lday_eu, "U(Lday)")
            .await?;
        let evening = self
            .indicator_uncertainty(&quarter, &evening_windows(start), levening_eu, "U(Levening)")
            .await?;
        let night = self
            .indicator_uncertainty(&half, &night_windows(start), lnight_eu, "U(Lnight)")
            .await?;

        let (Some(day), Some(evening), Some(night)) = (day, evening, night) else {
            error!(db = %self.db, %start, "Incomplete indicator uncertainties, nothing written");
            return Ok(());
        };

        let u_lden = lden_uncertainty(day, evening, night);
        info!(db = %self.db, u_lden, "U(Lden) computed");

        self.store.ensure_measurement_table(&self.db, "U_Lden").await?;
        self.store
            .insert_measurement(&self.db, "U_Lden", start, u_lden)
            .await
    }
}
