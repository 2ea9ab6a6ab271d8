//! Snapping instants to grid interval boundaries
//!
//! Boundaries are computed on the wall clock of the instant's own timezone:
//! seconds and sub-seconds are dropped and the minute-of-hour is reduced
//! modulo the interval.

use chrono::{DateTime, Duration, TimeZone, Timelike};

/// Latest interval boundary at or before `instant`.
pub fn floor_to_interval<T: TimeZone>(instant: &DateTime<T>, interval_minutes: u32) -> DateTime<T> {
    let interval = interval_minutes.max(1);
    let excess = Duration::minutes(i64::from(instant.minute() % interval))
        + Duration::seconds(i64::from(instant.second()))
        + Duration::nanoseconds(i64::from(instant.nanosecond()));
    instant.clone() - excess
}

/// Earliest interval boundary at or after `instant`.
pub fn ceil_to_interval<T: TimeZone>(instant: &DateTime<T>, interval_minutes: u32) -> DateTime<T> {
    let floored = floor_to_interval(instant, interval_minutes);
    if floored == *instant {
        floored
    } else {
        floored + Duration::minutes(i64::from(interval_minutes.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use chrono_tz::Tz;

    use super::*;

    fn berlin(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        chrono_tz::Europe::Berlin.with_ymd_and_hms(2024, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn floor_drops_seconds_and_partial_interval() {
        assert_eq!(floor_to_interval(&berlin(8, 52, 41), 15), berlin(8, 45, 0));
        assert_eq!(floor_to_interval(&berlin(8, 45, 0), 15), berlin(8, 45, 0));
        assert_eq!(floor_to_interval(&berlin(8, 59, 59), 60), berlin(8, 0, 0));
    }

    #[test]
    fn ceil_moves_to_next_boundary_only_when_needed() {
        assert_eq!(ceil_to_interval(&berlin(10, 30, 0), 15), berlin(10, 30, 0));
        assert_eq!(ceil_to_interval(&berlin(10, 31, 0), 15), berlin(10, 45, 0));
        assert_eq!(ceil_to_interval(&berlin(10, 30, 1), 15), berlin(10, 45, 0));
        let late = berlin(23, 50, 0);
        assert_eq!(ceil_to_interval(&late, 15), late + Duration::minutes(10));
    }

    #[test]
    fn works_on_utc_instants() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 5, 9, 7, 3).unwrap();
        let at = |m| Utc.with_ymd_and_hms(2024, 1, 5, 9, m, 0).unwrap();
        assert_eq!(floor_to_interval(&instant, 5), at(5));
        assert_eq!(ceil_to_interval(&instant, 5), at(10));
    }
}
