//! Time-windowed aggregators.
//!
//! An explicit registry maps parameter names onto aggregator constructors;
//! the configuration selects which entries are instantiated. Equivalent
//! level parameters get the hierarchical LAeq chain (plus the daily Lden
//! and uncertainty stages for the A-weighted regulatory indicator),
//! fast-level parameters get the statistical percentile aggregator.

mod laeq;
mod laf;
mod uncertainty;

pub(crate) use {
    laeq::LaeqAggregator, laf::PercentileAggregator, uncertainty::UncertaintyAggregator,
};

use crate::{
    scheduler::{Interval, IntervalScheduler},
    store::LocalStore,
};

use std::sync::Arc;

use tracing::{debug, warn};

/// Subscribes the aggregators selected by the parameter list.
pub(crate) fn register_aggregators(
    scheduler: &mut IntervalScheduler,
    parameters: &[String],
    store: &Arc<LocalStore>,
) {
    for parameter in parameters {
        match parameter.as_str() {
            "LAeq" => {
                let laeq = Arc::new(LaeqAggregator::new(
                    parameter.clone(),
                    Arc::clone(store),
                    true,
                ));
                scheduler.subscribe_many(&Interval::all(), laeq);

                let uncertainty = Arc::new(UncertaintyAggregator::new(
                    parameter.clone(),
                    Arc::clone(store),
                ));
                scheduler.subscribe(Interval::TwentyFourHours, uncertainty);
            }
            "LCeq" | "LZeq" => {
                let laeq = Arc::new(LaeqAggregator::new(
                    parameter.clone(),
                    Arc::clone(store),
                    false,
                ));
                scheduler.subscribe_many(&Interval::all(), laeq);
            }
            "LAF" | "LCF" | "LZF" => {
                let percentiles = Arc::new(PercentileAggregator::new(
                    parameter.clone(),
                    Arc::clone(store),
                ));
                scheduler.subscribe_many(
                    &[Interval::OneMinute, Interval::TwentyFourHours],
                    percentiles,
                );
            }
            // Min/max parameters are stored raw; no windowed aggregate.
            other if other.ends_with("min") || other.ends_with("max") => {
                debug!(parameter = other, "No aggregator for parameter");
            }
            other => {
                warn!(parameter = other, "Unknown parameter, no aggregator registered");
            }
        }
    }
}
