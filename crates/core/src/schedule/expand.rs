//! Recurrence expansion over a bounded window
//!
//! Turns parsed `VEVENT`s into concrete [`ScheduleEvent`]s. `RRULE`s are
//! expanded with the `rrule` crate; `RDATE`, `EXDATE` and `RECURRENCE-ID`
//! overrides are applied on top.
//!
//! The returned occurrences are ordered by start instant, then by the
//! position of their event in the document. The grid compiler relies on this
//! order when overlapping occurrences compete for a slot's variant.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use servertide_domain::{parse_variant, Result, ScheduleEvent, ServerTideError};
use tracing::{debug, warn};

use super::ical::{IcalTime, VEvent};

/// Closed interval `[start, end]` an occurrence must overlap to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExpansionWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

#[derive(Debug)]
struct Occurrence {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    declared: usize,
    variant: String,
}

/// Expand `events` into the occurrences overlapping `window`.
///
/// Cancelled events and cancelled overrides produce nothing. An override
/// (`RECURRENCE-ID`) replaces the series occurrence it names, whether or not
/// the replacement still falls in the window.
///
/// # Errors
/// `ServerTideError::CalendarParse` when a recurrence rule is rejected or a
/// time cannot be resolved.
pub fn expand_events(events: &[VEvent], window: &ExpansionWindow) -> Result<Vec<ScheduleEvent>> {
    let overrides = collect_overrides(events)?;
    let mut occurrences = Vec::new();

    for (declared, event) in events.iter().enumerate() {
        if event.cancelled {
            debug!(uid = ?event.uid, "skipping cancelled event");
            continue;
        }

        let length = event.occurrence_length()?;
        let variant = parse_variant(&event.description);

        let replaced = if event.recurrence_id.is_none() {
            event.uid.as_deref().and_then(|uid| overrides.get(uid))
        } else {
            None
        };

        for start in occurrence_starts(event, window, length)? {
            if replaced.is_some_and(|ids| ids.contains(&start)) {
                continue;
            }
            let end = start + length;
            if window.overlaps(start, end) {
                occurrences.push(Occurrence { start, end, declared, variant: variant.clone() });
            }
        }
    }

    occurrences.sort_by(|a, b| a.start.cmp(&b.start).then(a.declared.cmp(&b.declared)));
    debug!(occurrences = occurrences.len(), window_start = %window.start, "expanded calendar");

    Ok(occurrences
        .into_iter()
        .map(|occurrence| ScheduleEvent::new(occurrence.start, occurrence.end, occurrence.variant))
        .collect())
}

/// Instants named by `RECURRENCE-ID`, keyed by UID.
fn collect_overrides(events: &[VEvent]) -> Result<HashMap<&str, HashSet<DateTime<Utc>>>> {
    let mut overrides: HashMap<&str, HashSet<DateTime<Utc>>> = HashMap::new();
    for event in events {
        if let (Some(uid), Some(recurrence_id)) = (event.uid.as_deref(), event.recurrence_id) {
            overrides.entry(uid).or_default().insert(recurrence_id.to_utc()?);
        }
    }
    Ok(overrides)
}

fn occurrence_starts(
    event: &VEvent,
    window: &ExpansionWindow,
    length: Duration,
) -> Result<Vec<DateTime<Utc>>> {
    let first = event.start.to_utc()?;
    if !event.is_recurring() {
        return Ok(vec![first]);
    }

    let mut starts = if event.rrules.is_empty() {
        vec![first]
    } else {
        rule_starts(event, window, length)?
    };
    for rdate in &event.rdates {
        starts.push(rdate.to_utc()?);
    }

    let excluded =
        event.exdates.iter().map(IcalTime::to_utc).collect::<Result<HashSet<DateTime<Utc>>>>()?;
    starts.retain(|start| !excluded.contains(start));
    starts.sort();
    starts.dedup();
    Ok(starts)
}

fn rule_starts(
    event: &VEvent,
    window: &ExpansionWindow,
    length: Duration,
) -> Result<Vec<DateTime<Utc>>> {
    let mut text = event.start.dtstart_line();
    for rule in &event.rrules {
        text.push_str("\nRRULE:");
        text.push_str(&normalize_until(rule, event.start.rule_timezone())?);
    }

    let set: RRuleSet = text.parse().map_err(|e: rrule::RRuleError| {
        ServerTideError::CalendarParse(format!(
            "recurrence rule of event '{}' rejected: {e}",
            event.uid.as_deref().unwrap_or(&event.summary)
        ))
    })?;

    let after = (window.start - length - Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
    let before = (window.end + Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
    let result = set.after(after).before(before).all(u16::MAX);
    if result.limited {
        warn!(uid = ?event.uid, "recurrence expansion hit the occurrence limit");
    }

    Ok(result.dates.iter().map(|date| date.with_timezone(&Utc)).collect())
}

/// Rewrite a floating or zoned `UNTIL` as UTC.
///
/// A date-only `UNTIL` includes the whole day.
fn normalize_until(rule: &str, tz: Option<Tz>) -> Result<String> {
    let parts = rule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value))
                if key.trim().eq_ignore_ascii_case("UNTIL")
                    && !value.trim().ends_with(['Z', 'z']) =>
            {
                let until = parse_until(value.trim(), tz)?;
                Ok(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")))
            }
            _ => Ok(part.to_string()),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(";"))
}

fn parse_until(value: &str, tz: Option<Tz>) -> Result<DateTime<Utc>> {
    let invalid = || ServerTideError::CalendarParse(format!("invalid UNTIL '{value}'"));

    let naive = if value.len() == 8 {
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .and_then(|date| date.and_hms_opt(23, 59, 59))
            .ok_or_else(invalid)?
    } else {
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?
    };

    match tz {
        Some(tz) => IcalTime::Local { naive, tz }.to_utc(),
        None => IcalTime::Utc(naive).to_utc(),
    }
}
