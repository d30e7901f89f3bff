// Schedule strings are stored in the shared database and read by every
// worker; these tests pin the accepted grammar so stored values keep working.

use chrono::{TimeZone, Utc};
use tempo_cron::{is_due, next_run_after, CronError, Schedule};

#[test]
fn every_grammar_alternative_is_accepted() {
    for ok in [
        "5 * * * *",
        "* * * * *",
        "0,15,30,45 * * * *",
        "0 9-17 * * *",
        "0 5/2 * * *",
        "0 8-18/2 * * *",
        "*/10 * * * *",
        "0 0 1 1 0",
        "0 0 * * 7",
        "@reboot",
        "@every 1 hour",
        "@after 30 seconds",
    ] {
        assert!(Schedule::parse(ok).is_ok(), "{ok:?} should be accepted");
    }
}

#[test]
fn error_kinds_distinguish_format_from_range() {
    assert!(matches!(
        Schedule::parse("0 25 * * *"),
        Err(CronError::Range { field: "hours", .. })
    ));
    assert!(matches!(
        Schedule::parse("0 5 * *"),
        Err(CronError::Format(_))
    ));
}

#[test]
fn daily_schedule_round_trip() {
    let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let five = Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
    let next_day = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();

    assert_eq!(next_run_after("0 5 * * *", midnight).unwrap(), Some(five));
    assert_eq!(next_run_after("0 5 * * *", five).unwrap(), Some(next_day));
    assert!(is_due(Some("0 5 * * *"), five).unwrap());
    assert!(!is_due(Some("0 5 * * *"), midnight).unwrap());
}
