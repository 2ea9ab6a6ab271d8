//! Desired-state evaluator

use chrono::{DateTime, TimeZone};
use servertide_domain::{DesiredState, Result, ServerTideError, TimeGrid};

use super::rounding::floor_to_interval;

/// What the schedule wants at `reference`.
///
/// The instant is truncated to its interval boundary and looked up by exact
/// equality. No matching slot means "off".
///
/// # Errors
/// `ServerTideError::Invariant` for an empty grid.
pub fn evaluate<T: TimeZone>(
    grid: &TimeGrid,
    reference: &DateTime<T>,
    interval_minutes: u32,
) -> Result<DesiredState> {
    if grid.is_empty() {
        return Err(ServerTideError::Invariant("evaluated an empty grid".into()));
    }

    let instant = floor_to_interval(reference, interval_minutes).timestamp();
    let desired = grid
        .index_of(instant)
        .and_then(|index| grid.slot(index))
        .filter(|slot| slot.active)
        .map(|slot| DesiredState::active(slot.variant))
        .unwrap_or_default();

    Ok(desired)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    const START: i64 = 1_704_441_600; // 2024-01-05T08:00:00Z

    fn grid() -> TimeGrid {
        let mut grid = TimeGrid::new(START, 900).unwrap();
        grid.mark(2..=4, "cx21");
        grid.mark(10..=10, "");
        grid
    }

    fn at(offset_seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(START + offset_seconds, 0).unwrap()
    }

    #[test]
    fn every_slot_evaluates_to_itself() {
        let grid = grid();
        for slot in grid.slots() {
            let instant = DateTime::from_timestamp(slot.instant, 0).unwrap();
            let desired = evaluate(&grid, &instant, 15).unwrap();
            assert_eq!(desired.active, slot.active);
            assert_eq!(desired.variant, if slot.active { slot.variant } else { "" });
        }
    }

    #[test]
    fn instant_inside_slot_is_truncated() {
        let desired = evaluate(&grid(), &(at(1800) + Duration::seconds(599)), 15).unwrap();
        assert_eq!(desired, DesiredState::active("cx21"));
        assert!(evaluate(&grid(), &at(10 * 900 + 61), 15).unwrap().active);
    }

    #[test]
    fn instant_outside_grid_is_off() {
        assert_eq!(evaluate(&grid(), &at(-900), 15).unwrap(), DesiredState::inactive());
        assert_eq!(evaluate(&grid(), &at(86_400), 15).unwrap(), DesiredState::inactive());
    }

    #[test]
    fn empty_grid_is_an_invariant_violation() {
        let result = evaluate(&TimeGrid::default(), &at(0), 15);
        assert!(matches!(result, Err(ServerTideError::Invariant(_))));
    }

    #[test]
    fn evaluates_in_any_timezone() {
        let local = at(3 * 900).with_timezone(&chrono_tz::Asia::Kolkata);
        assert!(evaluate(&grid(), &local, 15).unwrap().active);
    }
}
