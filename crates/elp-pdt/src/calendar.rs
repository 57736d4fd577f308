//! Week boundaries in a single fixed reference timezone.
//!
//! A PDT week starts Monday 00:00 in the reference zone (exchange time by
//! default). Computing the boundary in one named zone, rather than the host's
//! local time, keeps every process and every test in agreement across DST.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Monday (in `tz`) of the week containing `now`.
pub fn week_start_for(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    let local = now.with_timezone(&tz).date_naive();
    let since_monday = local.weekday().num_days_from_monday() as i64;
    local - Duration::days(since_monday)
}

/// The UTC instant of Monday 00:00 in `tz` for the week starting `monday`.
///
/// Midnight is never skipped by US/EU DST rules; if a zone ever makes it
/// ambiguous the earlier instant wins, and a nonexistent midnight falls back
/// to 00:00 UTC of that date.
pub fn week_start_instant(monday: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = monday.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(t) => t.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Monday of the following week.
pub fn next_week_start(monday: NaiveDate) -> NaiveDate {
    monday + Duration::days(7)
}
