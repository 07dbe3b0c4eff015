use crate::supervisor::{latest_staged_minute, next_reset_delay};

use std::fs;
use std::time::Duration;

use chrono::NaiveDate;

fn at(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 10)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

/// WHAT: The next reset is the sooner of the two daily times
/// WHY: Resets are fixed at 02:00:03 and 13:00:03 local
#[test]
fn given_times_of_day_when_computing_delay_then_next_reset_chosen() {
    // Just past midnight: the 02:00:03 reset is ahead.
    assert_eq!(
        next_reset_delay(at(0, 0, 0)),
        Duration::from_secs(2 * 3600 + 3)
    );

    // Mid-morning: 13:00:03 is next.
    assert_eq!(
        next_reset_delay(at(10, 0, 3)),
        Duration::from_secs(3 * 3600)
    );

    // Evening: tomorrow's 02:00:03 wins.
    assert_eq!(
        next_reset_delay(at(20, 0, 3)),
        Duration::from_secs(6 * 3600)
    );
}

/// WHAT: A reset instant schedules the next day's occurrence
/// WHY: Firing must never loop on the same instant
#[test]
fn given_exact_reset_instant_when_computing_delay_then_future_instant() {
    let delay = next_reset_delay(at(2, 0, 3));

    assert!(delay > Duration::ZERO);
    assert_eq!(delay, Duration::from_secs(11 * 3600));
}

/// WHAT: The newest staged minute wins, foreign files ignored
/// WHY: The stall watchdog keys on staged-file timestamps only
#[test]
fn given_staged_files_when_scanning_then_latest_minute_found() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(dir.path().join("2024-06-10 09-00-00.mp3"), b"x").unwrap();
    fs::write(dir.path().join("2024-06-10 09-02-00.mp3"), b"x").unwrap();
    fs::write(dir.path().join("2024-06-10 09-01-00.mp3"), b"x").unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    fs::write(dir.path().join("broken.mp3"), b"x").unwrap();

    let latest = latest_staged_minute(dir.path(), "mp3");

    assert_eq!(latest, Some(at(9, 2, 0)));
}

/// WHAT: An empty or missing directory yields no timestamp
/// WHY: Absence of files counts as a stall scan, not a crash
#[test]
fn given_empty_directory_when_scanning_then_none() {
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(latest_staged_minute(dir.path(), "mp3"), None);
    assert_eq!(
        latest_staged_minute(&dir.path().join("missing"), "mp3"),
        None
    );
}
