//! Acoustic level mathematics: equivalent levels, statistical percentiles,
//! the Lden day-evening-night composite and ISO 1996-2 Annex G uncertainty.

mod laeq;
mod lden;
mod percentiles;
mod uncertainty;

pub use {
    laeq::{is_valid_level, laeq, round2},
    lden::lden,
    percentiles::{PercentileSet, percentile, percentile_set},
    uncertainty::{
        GroupUncertainty, IntervalUncertainty, group_uncertainty, interval_uncertainty,
        lden_uncertainty,
    },
};
