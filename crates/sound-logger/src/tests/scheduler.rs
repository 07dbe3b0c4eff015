use crate::scheduler::Interval;

use chrono::NaiveDate;

fn at(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 10)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

/// WHAT: Nothing fires off the whole-second minute boundary
/// WHY: Boundaries are exact wall-clock instants
#[test]
fn given_mid_second_when_checking_then_no_interval_fires() {
    for interval in Interval::all() {
        assert!(!interval.fires_at(at(12, 5, 30)));
        assert!(!interval.fires_at(at(0, 0, 1)));
    }
}

/// WHAT: Each interval fires exactly on its own boundary
/// WHY: Subscribers must be triggered at minute %k == 0 instants
#[test]
fn given_boundaries_when_checking_then_matching_intervals_fire() {
    let five_past = at(9, 5, 0);
    assert!(Interval::OneMinute.fires_at(five_past));
    assert!(Interval::FiveMinutes.fires_at(five_past));
    assert!(!Interval::FifteenMinutes.fires_at(five_past));
    assert!(!Interval::OneHour.fires_at(five_past));

    let half_past = at(9, 30, 0);
    assert!(Interval::FifteenMinutes.fires_at(half_past));
    assert!(Interval::ThirtyMinutes.fires_at(half_past));
    assert!(!Interval::OneHour.fires_at(half_past));

    let on_the_hour = at(9, 0, 0);
    assert!(Interval::OneHour.fires_at(on_the_hour));
    assert!(!Interval::TwentyFourHours.fires_at(on_the_hour));

    let midnight = at(0, 0, 0);
    for interval in Interval::all() {
        assert!(interval.fires_at(midnight));
    }
}

/// WHAT: Window length subtracts back to the expected start
/// WHY: Aggregators read [end - length, end)
#[test]
fn given_boundary_when_subtracting_length_then_window_start_correct() {
    let end = at(10, 0, 0);

    assert_eq!(end - Interval::OneMinute.length(), at(9, 59, 0));
    assert_eq!(end - Interval::FifteenMinutes.length(), at(9, 45, 0));
    assert_eq!(end - Interval::OneHour.length(), at(9, 0, 0));
}

/// WHAT: Table suffixes match the storage naming scheme
/// WHY: Aggregate tables are `<param><suffix>`
#[test]
fn given_intervals_when_naming_then_suffixes_match() {
    let suffixes: Vec<&str> = Interval::all().iter().map(|i| i.table_suffix()).collect();

    assert_eq!(suffixes, vec!["1min", "5min", "15min", "30min", "1h", "24h"]);
}
