//! Statistical percentile aggregation over fast-weighted levels.

use crate::{
    AppResult,
    scheduler::{Interval, IntervalSubscriber},
    store::LocalStore,
};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sound_logger_core::percentile_set;
use tracing::info;

/// L5..L95 aggregator for one fast-level parameter database.
pub(crate) struct PercentileAggregator {
    db: String,
    store: Arc<LocalStore>,
}

impl PercentileAggregator {
    pub(crate) fn new(db: String, store: Arc<LocalStore>) -> Self {
        Self { db, store }
    }
}

#[async_trait]
impl IntervalSubscriber for PercentileAggregator {
    fn name(&self) -> &'static str {
        "percentile-aggregator"
    }

    async fn on_interval(
        &self,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<()> {
        // Both windows rank the raw per-second samples.
        let values = self
            .store
            .fetch_values(&self.db, &self.db, start, end)
            .await?;

        let Some(set) = percentile_set(&values) else {
            info!(db = %self.db, %start, %end, "No valid data for percentiles");
            return Ok(());
        };

        let target = format!("{}_percentiles_{}", self.db, interval.table_suffix());
        self.store.ensure_percentile_table(&self.db, &target).await?;
        self.store
            .insert_percentiles(&self.db, &target, start, &set)
            .await
    }
}
