//! Grid compiler
//!
//! Rasterizes the calendar onto a [`TimeGrid`] covering 24 hours from the
//! interval boundary at or before the reference instant.
//!
//! Each occurrence is padded (`lead_minutes` before, `lag_minutes` after),
//! snapped outwards to interval boundaries and then marks every slot between
//! the two boundaries, inclusive. An occurrence whose snapped start and end
//! both miss the grid's instants is skipped entirely.
//!
//! Occurrences are applied in ascending order of padded start, then of their
//! event's position in the document. When occurrences overlap, the one applied
//! last decides the slot's variant.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use servertide_domain::constants::SECONDS_PER_DAY;
use servertide_domain::{
    CalendarDocument, Result, ScheduleConfig, ScheduleEvent, ServerTideError, TimeGrid,
};
use tracing::{debug, instrument};

use super::expand::{expand_events, ExpansionWindow};
use super::ical::parse_calendar;
use super::rounding::{ceil_to_interval, floor_to_interval};

/// Grid resolution, event padding and the timezone interval boundaries are
/// computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSettings {
    pub interval_minutes: u32,
    pub lead_minutes: u32,
    pub lag_minutes: u32,
    pub timezone: Tz,
}

impl GridSettings {
    /// # Errors
    /// `ServerTideError::Config` when the interval does not divide an hour.
    pub fn new(
        interval_minutes: u32,
        lead_minutes: u32,
        lag_minutes: u32,
        timezone: Tz,
    ) -> Result<Self> {
        if interval_minutes == 0 || interval_minutes > 60 || 60 % interval_minutes != 0 {
            return Err(ServerTideError::Config(format!(
                "grid interval must divide 60 minutes, got {interval_minutes}"
            )));
        }
        Ok(Self { interval_minutes, lead_minutes, lag_minutes, timezone })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(config.interval_minutes, config.lead_minutes, config.lag_minutes, config.tz()?)
    }

    pub fn step_seconds(&self) -> i64 {
        i64::from(self.interval_minutes) * 60
    }

    fn lead(&self) -> Duration {
        Duration::minutes(i64::from(self.lead_minutes))
    }

    fn lag(&self) -> Duration {
        Duration::minutes(i64::from(self.lag_minutes))
    }
}

/// First instant of the grid compiled for `reference`.
pub fn window_start(reference: &DateTime<Utc>, settings: &GridSettings) -> DateTime<Tz> {
    floor_to_interval(&reference.with_timezone(&settings.timezone), settings.interval_minutes)
}

/// Compile `document` into the grid for the window containing `reference`.
///
/// # Errors
/// `ServerTideError::CalendarParse` when the document cannot be read; no
/// partial grid is ever returned.
#[instrument(skip(document), fields(bytes = document.len()))]
pub fn compile(
    document: &CalendarDocument,
    reference: DateTime<Utc>,
    settings: &GridSettings,
) -> Result<TimeGrid> {
    let start = window_start(&reference, settings).with_timezone(&Utc);
    let end = start + Duration::seconds(SECONDS_PER_DAY - 1);

    let events = parse_calendar(document.bytes(), settings.timezone)?;
    // Widened so occurrences that only reach the window through padding are seen.
    let window = ExpansionWindow::new(start - settings.lag(), end + settings.lead());
    let occurrences = expand_events(&events, &window)?;

    let mut grid = TimeGrid::new(start.timestamp(), settings.step_seconds())?;
    rasterize(&mut grid, &occurrences, settings);

    debug!(
        window_start = %start,
        slots = grid.len(),
        active_slots = grid.active_count(),
        occurrences = occurrences.len(),
        "compiled grid"
    );
    Ok(grid)
}

/// Mark the slots covered by `occurrences`, in the order given.
pub fn rasterize(grid: &mut TimeGrid, occurrences: &[ScheduleEvent], settings: &GridSettings) {
    let Some(last) = grid.len().checked_sub(1) else {
        return;
    };

    for occurrence in occurrences {
        let start = occurrence.start.with_timezone(&settings.timezone) - settings.lead();
        let end = occurrence.end.with_timezone(&settings.timezone) + settings.lag();
        let start = floor_to_interval(&start, settings.interval_minutes).timestamp();
        let end = ceil_to_interval(&end, settings.interval_minutes).timestamp();

        let (first_slot, last_slot) = match (grid.index_of(start), grid.index_of(end)) {
            (None, None) => {
                debug!(start, end, "occurrence misses every grid instant, skipping");
                continue;
            }
            (Some(first), Some(final_slot)) => (first, final_slot),
            (Some(first), None) => (first, last),
            (None, Some(final_slot)) => (0, final_slot),
        };

        grid.mark(first_slot..=last_slot, &occurrence.variant);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::schedule::evaluate;

    const BERLIN: Tz = chrono_tz::Europe::Berlin;

    fn settings() -> GridSettings {
        GridSettings::new(15, 15, 30, BERLIN).unwrap()
    }

    fn document(body: &str) -> CalendarDocument {
        let text = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{body}END:VCALENDAR\r\n"
        );
        CalendarDocument::new(text.into_bytes(), Utc::now())
    }

    fn berlin(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        BERLIN.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap().with_timezone(&Utc)
    }

    fn active_range(grid: &TimeGrid) -> Option<(i64, i64)> {
        let active: Vec<i64> = grid.slots().filter(|s| s.active).map(|s| s.instant).collect();
        Some((*active.first()?, *active.last()?))
    }

    #[test]
    fn grid_shape_matches_interval() {
        for interval in [1, 5, 15, 30, 60] {
            let settings = GridSettings::new(interval, 0, 0, BERLIN).unwrap();
            let grid = compile(&document(""), berlin(5, 7, 13), &settings).unwrap();
            let step = i64::from(interval) * 60;
            assert_eq!(grid.len() as i64, SECONDS_PER_DAY / step);
            assert!(grid.instants().windows(2).all(|pair| pair[1] - pair[0] == step));
            assert_eq!(grid.active_count(), 0);
        }
    }

    #[test]
    fn window_starts_at_previous_boundary() {
        let at = berlin(5, 7, 13) + Duration::seconds(42);
        let grid = compile(&document(""), at, &settings()).unwrap();
        assert_eq!(grid.first_instant(), Some(berlin(5, 7, 0).timestamp()));
    }

    #[test]
    fn one_hour_event_is_padded_by_lead_and_lag() {
        let doc = document(concat!(
            "BEGIN:VEVENT\r\nUID:a\r\nDTSTART;TZID=Europe/Berlin:20240105T090000\r\n",
            "DTEND;TZID=Europe/Berlin:20240105T100000\r\nEND:VEVENT\r\n",
        ));
        let grid = compile(&doc, berlin(5, 6, 0), &settings()).unwrap();

        assert_eq!(
            active_range(&grid),
            Some((berlin(5, 8, 45).timestamp(), berlin(5, 10, 30).timestamp()))
        );
        assert_eq!(grid.active_count(), 8);
        assert!(grid.slots().filter(|s| s.active).all(|s| s.variant.is_empty()));

        let at = |h, m| evaluate(&grid, &berlin(5, h, m).with_timezone(&BERLIN), 15).unwrap();
        assert!(at(8, 50).active);
        assert_eq!(at(8, 50).variant, "");
        assert!(!at(8, 30).active);
        assert!(at(10, 30).active);
        assert!(!at(10, 45).active);
    }

    #[test]
    fn overlapping_events_apply_in_start_then_declaration_order() {
        let doc = document(concat!(
            "BEGIN:VEVENT\r\nUID:big\r\nDTSTART;TZID=Europe/Berlin:20240105T090000\r\n",
            "DTEND;TZID=Europe/Berlin:20240105T100000\r\nDESCRIPTION:server_type: cx31\r\n",
            "END:VEVENT\r\n",
            "BEGIN:VEVENT\r\nUID:small\r\nDTSTART;TZID=Europe/Berlin:20240105T090000\r\n",
            "DTEND;TZID=Europe/Berlin:20240105T100000\r\nDESCRIPTION:server_type: cx21\r\n",
            "END:VEVENT\r\n",
            "BEGIN:VEVENT\r\nUID:late\r\nDTSTART;TZID=Europe/Berlin:20240105T093000\r\n",
            "DTEND;TZID=Europe/Berlin:20240105T094500\r\nDESCRIPTION:SERVER_TYPE: ccx13\r\n",
            "END:VEVENT\r\n",
        ));
        let grid = compile(&doc, berlin(5, 6, 0), &settings()).unwrap();
        let variant_at = |h, m| {
            let idx = grid.index_of(berlin(5, h, m).timestamp()).unwrap();
            grid.slot(idx).unwrap().variant.to_string()
        };

        // Same start: the event declared later is applied last.
        assert_eq!(variant_at(8, 45), "cx21");
        // The 09:30 event starts later and is applied after both.
        assert_eq!(variant_at(9, 15), "ccx13");
        assert_eq!(variant_at(10, 15), "ccx13");
    }

    #[test]
    fn occurrence_extending_past_window_is_clamped() {
        let doc = document(concat!(
            "BEGIN:VEVENT\r\nUID:n\r\nDTSTART;TZID=Europe/Berlin:20240105T220000\r\n",
            "DTEND;TZID=Europe/Berlin:20240106T090000\r\nEND:VEVENT\r\n",
        ));
        let grid = compile(&doc, berlin(5, 6, 0), &settings()).unwrap();
        let last = grid.slot(grid.len() - 1).unwrap();
        assert!(last.active);
        assert_eq!(active_range(&grid).map(|r| r.0), Some(berlin(5, 21, 45).timestamp()));
    }

    #[test]
    fn occurrence_started_before_window_marks_from_first_slot() {
        let doc = document(concat!(
            "BEGIN:VEVENT\r\nUID:m\r\nDTSTART;TZID=Europe/Berlin:20240105T040000\r\n",
            "DTEND;TZID=Europe/Berlin:20240105T070000\r\nEND:VEVENT\r\n",
        ));
        let grid = compile(&doc, berlin(5, 6, 0), &settings()).unwrap();
        assert_eq!(
            active_range(&grid),
            Some((berlin(5, 6, 0).timestamp(), berlin(5, 7, 30).timestamp()))
        );
    }

    #[test]
    fn occurrence_covering_whole_window_is_skipped() {
        let doc = document(concat!(
            "BEGIN:VEVENT\r\nUID:w\r\nDTSTART;TZID=Europe/Berlin:20240104T000000\r\n",
            "DTEND;TZID=Europe/Berlin:20240107T000000\r\nEND:VEVENT\r\n",
        ));
        let grid = compile(&doc, berlin(5, 6, 0), &settings()).unwrap();
        assert_eq!(grid.active_count(), 0);
    }

    #[test]
    fn malformed_document_fails_whole_compile() {
        let doc = CalendarDocument::new(b"<html>not a calendar</html>".to_vec(), Utc::now());
        assert!(matches!(
            compile(&doc, berlin(5, 6, 0), &settings()),
            Err(ServerTideError::CalendarParse(_))
        ));
    }

    #[test]
    fn compile_is_stable_within_one_slot() {
        let doc = document(concat!(
            "BEGIN:VEVENT\r\nUID:r\r\nDTSTART:20240101T120000Z\r\nDTEND:20240101T130000Z\r\n",
            "RRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        ));
        let a = compile(&doc, berlin(5, 6, 1), &settings()).unwrap();
        let b = compile(&doc, berlin(5, 6, 14), &settings()).unwrap();
        assert_eq!(a, b);
        assert!(a.active_count() > 0);
    }

    #[test]
    fn rejects_interval_not_dividing_an_hour() {
        assert!(matches!(GridSettings::new(7, 0, 0, BERLIN), Err(ServerTideError::Config(_))));
        assert!(GridSettings::new(0, 0, 0, BERLIN).is_err());
        assert!(GridSettings::new(90, 0, 0, BERLIN).is_err());
    }
}
