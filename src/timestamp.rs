//! Timestamp reconstruction for bare time-of-day tokens.
//!
//! iotop prints `HH:MM:SS` with no date component. The missing date is
//! taken from the reference clock, rolling back across midnight when the
//! token is ahead of the reference (sampling jitter around day boundaries)
//! and discarding anything that ends up a full day old.

use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Rebuilds an absolute timestamp from a time-of-day and a reference `now`.
///
/// The candidate combines `now`'s calendar date with the given
/// hour/minute/second, sub-second zero. A candidate strictly after `now`
/// is rolled back one day at a time until it is not; a candidate at or
/// before `now - 24h` is stale and yields `None`. The staleness bound also
/// closes off the rollback loop if `now` itself is corrupted.
pub fn reconstruct(time_of_day: NaiveTime, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let mut candidate = now.date().and_time(time_of_day);

    // Normally at most one subtraction: the candidate starts on now's own
    // date, so it can be ahead of now by less than a day.
    while candidate > now {
        candidate -= Duration::days(1);
    }

    if candidate <= now - Duration::days(1) {
        return None;
    }

    Some(candidate)
}
