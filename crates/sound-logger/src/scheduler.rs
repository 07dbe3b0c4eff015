//! Wall-clock interval scheduler.
//!
//! Once per second the scheduler checks which named intervals fire at that
//! exact boundary and notifies every subscriber. Each notification runs as
//! its own task: a slow subscriber never delays the next boundary, and an
//! error in one subscriber never reaches another. Missed ticks are skipped,
//! not replayed.

use crate::AppResult;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Timelike};
use sound_logger_core::{TimestampProvider, truncate_to_second};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Named aggregation intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Interval {
    /// One minute.
    OneMinute,
    /// Five minutes.
    FiveMinutes,
    /// Fifteen minutes.
    FifteenMinutes,
    /// Thirty minutes.
    ThirtyMinutes,
    /// One hour.
    OneHour,
    /// Twenty-four hours.
    TwentyFourHours,
}

impl Interval {
    /// All intervals, finest first.
    pub(crate) fn all() -> [Interval; 6] {
        [
            Interval::OneMinute,
            Interval::FiveMinutes,
            Interval::FifteenMinutes,
            Interval::ThirtyMinutes,
            Interval::OneHour,
            Interval::TwentyFourHours,
        ]
    }

    /// Window length.
    pub(crate) fn length(self) -> ChronoDuration {
        match self {
            Interval::OneMinute => ChronoDuration::minutes(1),
            Interval::FiveMinutes => ChronoDuration::minutes(5),
            Interval::FifteenMinutes => ChronoDuration::minutes(15),
            Interval::ThirtyMinutes => ChronoDuration::minutes(30),
            Interval::OneHour => ChronoDuration::hours(1),
            Interval::TwentyFourHours => ChronoDuration::hours(24),
        }
    }

    /// Suffix used in aggregate table names (`LAeq1min`, `LAeq24h`, ...).
    pub(crate) fn table_suffix(self) -> &'static str {
        match self {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::ThirtyMinutes => "30min",
            Interval::OneHour => "1h",
            Interval::TwentyFourHours => "24h",
        }
    }

    /// Whether this interval fires at the given wall-clock second.
    pub(crate) fn fires_at(self, t: NaiveDateTime) -> bool {
        if t.second() != 0 {
            return false;
        }
        match self {
            Interval::OneMinute => true,
            Interval::FiveMinutes => t.minute() % 5 == 0,
            Interval::FifteenMinutes => t.minute() % 15 == 0,
            Interval::ThirtyMinutes => t.minute() % 30 == 0,
            Interval::OneHour => t.minute() == 0,
            Interval::TwentyFourHours => t.hour() == 0 && t.minute() == 0,
        }
    }
}

/// A component notified when its subscribed intervals fire.
#[async_trait]
pub(crate) trait IntervalSubscriber: Send + Sync {
    /// Stable name for logging.
    fn name(&self) -> &'static str;

    /// Handles the boundary `[start, end)` of one fired interval.
    async fn on_interval(
        &self,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<()>;
}

/// Boundary-triggered fan-out to subscribers.
pub(crate) struct IntervalScheduler {
    clock: TimestampProvider,
    subscriptions: Vec<(Interval, Arc<dyn IntervalSubscriber>)>,
}

impl IntervalScheduler {
    pub(crate) fn new(clock: TimestampProvider) -> Self {
        Self {
            clock,
            subscriptions: Vec::new(),
        }
    }

    /// Subscribes one handler to one interval.
    pub(crate) fn subscribe(&mut self, interval: Interval, subscriber: Arc<dyn IntervalSubscriber>) {
        debug!(subscriber = subscriber.name(), ?interval, "Subscribed");
        self.subscriptions.push((interval, subscriber));
    }

    /// Subscribes one handler to several intervals.
    pub(crate) fn subscribe_many(
        &mut self,
        intervals: &[Interval],
        subscriber: Arc<dyn IntervalSubscriber>,
    ) {
        for interval in intervals {
            self.subscribe(*interval, Arc::clone(&subscriber));
        }
    }

    /// Ticks once per second until cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        info!("Interval scheduler started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.clock.sleep_to_next_second()) => {}
            }

            let now = truncate_to_second(self.clock.now());

            for (interval, subscriber) in &self.subscriptions {
                if !interval.fires_at(now) {
                    continue;
                }

                let end = now;
                let start = end - interval.length();
                debug!(?interval, %start, %end, "Interval triggered");

                let interval = *interval;
                let subscriber = Arc::clone(subscriber);
                tokio::spawn(async move {
                    if let Err(e) = subscriber.on_interval(interval, start, end).await {
                        error!(
                            subscriber = subscriber.name(),
                            ?interval,
                            error = %e,
                            "Subscriber notification failed"
                        );
                    }
                });
            }
        }

        info!("Interval scheduler stopped");
    }
}
