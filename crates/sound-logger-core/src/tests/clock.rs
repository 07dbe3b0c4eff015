use crate::{TimestampProvider, truncate_to_minute, truncate_to_second};

use std::time::Duration;

/// WHAT: Start timestamp is truncated to a whole second
/// WHY: Every pipeline timestamp derives from the aligned start
#[test]
fn given_new_provider_when_reading_start_then_subsecond_is_zero() {
    let provider = TimestampProvider::new();

    let start = provider.start_timestamp();
    assert_eq!(start.timestamp_subsec_nanos(), 0);
}

/// WHAT: Sleep-to-next-second stays within one second
/// WHY: The sampler aligns on integral seconds without overshooting
#[test]
fn given_any_instant_when_computing_sleep_then_duration_is_sub_second() {
    let provider = TimestampProvider::new();

    let sleep = provider.sleep_to_next_second();
    assert!(sleep > Duration::ZERO);
    assert!(sleep <= Duration::from_secs(1));
}

/// WHAT: Second and minute truncation drop the expected components
/// WHY: Row timestamps and file names are boundary-aligned
#[test]
fn given_now_when_truncating_then_components_are_zeroed() {
    let provider = TimestampProvider::new();
    let now = provider.now();

    let second = truncate_to_second(now);
    assert_eq!(second.and_utc().timestamp_subsec_nanos(), 0);

    let minute = truncate_to_minute(now);
    assert_eq!(minute.and_utc().timestamp() % 60, 0);
}
