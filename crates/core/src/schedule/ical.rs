//! RFC 5545 reading on top of the `icalendar` parser
//!
//! The parser handles line unfolding, content lines and the component tree;
//! this module maps the `VEVENT` components into [`VEvent`] values with their
//! start, end, recurrence properties and description. Everything else
//! (alarms, todos, timezone definitions) is skipped.
//!
//! Times without a `TZID` (floating) and all-day dates are anchored in the
//! configured timezone. A `TZID` that is not an IANA name falls back to the
//! configured timezone as well.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{self, Component, Property};
use servertide_domain::{Result, ServerTideError};
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A point in time as written in the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcalTime {
    /// `...Z` suffix
    Utc(NaiveDateTime),
    /// Wall-clock time in a named (or defaulted) timezone
    Local { naive: NaiveDateTime, tz: Tz },
    /// `VALUE=DATE`, midnight in the given timezone
    Date { date: NaiveDate, tz: Tz },
}

impl IcalTime {
    /// Resolve to an absolute instant.
    ///
    /// Ambiguous wall times (DST fall-back) resolve to the earlier instant;
    /// non-existent ones (DST spring-forward gap) are pushed one hour later.
    pub fn to_utc(&self) -> Result<DateTime<Utc>> {
        match *self {
            Self::Utc(naive) => Ok(Utc.from_utc_datetime(&naive)),
            Self::Local { naive, tz } => resolve_local(tz, naive),
            Self::Date { date, tz } => {
                let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
                    ServerTideError::CalendarParse(format!("invalid date {date}"))
                })?;
                resolve_local(tz, midnight)
            }
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date { .. })
    }

    /// Timezone used to interpret recurrence rules anchored at this time.
    pub fn rule_timezone(&self) -> Option<Tz> {
        match *self {
            Self::Utc(_) => None,
            Self::Local { tz, .. } | Self::Date { tz, .. } => Some(tz),
        }
    }

    /// Render as a `DTSTART` content line understood by the recurrence engine.
    pub fn dtstart_line(&self) -> String {
        match *self {
            Self::Utc(naive) => format!("DTSTART:{}Z", naive.format(DATE_TIME_FORMAT)),
            Self::Local { naive, tz } => {
                format!("DTSTART;TZID={}:{}", tz.name(), naive.format(DATE_TIME_FORMAT))
            }
            Self::Date { date, tz } => {
                format!("DTSTART;TZID={}:{}T000000", tz.name(), date.format(DATE_FORMAT))
            }
        }
    }
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            ServerTideError::CalendarParse(format!("{naive} does not exist in {}", tz.name()))
        })
}

/// One `VEVENT` component.
#[derive(Debug, Clone, PartialEq)]
pub struct VEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub description: String,
    pub start: IcalTime,
    pub end: Option<IcalTime>,
    pub duration: Option<Duration>,
    pub rrules: Vec<String>,
    pub rdates: Vec<IcalTime>,
    pub exdates: Vec<IcalTime>,
    pub recurrence_id: Option<IcalTime>,
    pub cancelled: bool,
}

impl VEvent {
    /// Length of each occurrence.
    ///
    /// `DTEND` wins over `DURATION`; without either an all-day event lasts one
    /// day and a timed event is instantaneous.
    pub fn occurrence_length(&self) -> Result<Duration> {
        if let Some(end) = &self.end {
            let length = end.to_utc()? - self.start.to_utc()?;
            return Ok(length.max(Duration::zero()));
        }
        if let Some(duration) = self.duration {
            return Ok(duration.max(Duration::zero()));
        }
        Ok(if self.start.is_date() { Duration::days(1) } else { Duration::zero() })
    }

    pub fn is_recurring(&self) -> bool {
        !self.rrules.is_empty() || !self.rdates.is_empty()
    }
}

/// Parse calendar bytes into its events, in declaration order.
///
/// # Errors
/// `ServerTideError::CalendarParse` when the bytes are not UTF-8, the
/// document is not a `VCALENDAR`, or an event property cannot be read.
pub fn parse_calendar(bytes: &[u8], default_tz: Tz) -> Result<Vec<VEvent>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ServerTideError::CalendarParse(format!("calendar is not UTF-8: {e}")))?;
    let unfolded = parser::unfold(text.trim_start_matches('\u{feff}'));

    let opens_calendar = unfolded
        .lines()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"));
    if !opens_calendar {
        return Err(ServerTideError::CalendarParse("no VCALENDAR component found".into()));
    }

    let calendar = parser::read_calendar(&unfolded)
        .map_err(|e| ServerTideError::CalendarParse(format!("malformed calendar: {e}")))?;

    let mut events = Vec::new();
    collect_events(&calendar.components, default_tz, &mut events)?;

    debug!(events = events.len(), "parsed calendar");
    Ok(events)
}

/// Top-level `VEVENT`s, looking through a `VCALENDAR` wrapper if present.
/// Sub-components of events (alarms) are never visited.
fn collect_events(
    components: &[Component<'_>],
    default_tz: Tz,
    events: &mut Vec<VEvent>,
) -> Result<()> {
    for component in components {
        let name = component.name.as_str();
        if name.eq_ignore_ascii_case("VCALENDAR") {
            collect_events(&component.components, default_tz, events)?;
        } else if name.eq_ignore_ascii_case("VEVENT") {
            events.push(read_event(component, default_tz)?);
        }
    }
    Ok(())
}

fn read_event(component: &Component<'_>, default_tz: Tz) -> Result<VEvent> {
    let mut builder = EventBuilder::default();
    for property in &component.properties {
        builder.apply(property, default_tz)?;
    }
    builder.build()
}

fn param<'p>(property: &'p Property<'_>, key: &str) -> Option<&'p str> {
    property
        .params
        .iter()
        .find(|param| param.key.as_str().eq_ignore_ascii_case(key))
        .and_then(|param| param.val.as_ref())
        .map(|val| val.as_str().trim_matches('"'))
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: String,
    description: String,
    start: Option<IcalTime>,
    end: Option<IcalTime>,
    duration: Option<Duration>,
    rrules: Vec<String>,
    rdates: Vec<IcalTime>,
    exdates: Vec<IcalTime>,
    recurrence_id: Option<IcalTime>,
    cancelled: bool,
}

impl EventBuilder {
    fn apply(&mut self, property: &Property<'_>, default_tz: Tz) -> Result<()> {
        let name = property.name.as_str().to_ascii_uppercase();
        let value = property.val.as_str().trim();
        match name.as_str() {
            "UID" => self.uid = Some(value.to_string()),
            "SUMMARY" => self.summary = unescape_text(value),
            "DESCRIPTION" => self.description = unescape_text(value),
            "DTSTART" => self.start = Some(parse_time(property, &name, value, default_tz)?),
            "DTEND" => self.end = Some(parse_time(property, &name, value, default_tz)?),
            "DURATION" => self.duration = Some(parse_duration(value)?),
            "RRULE" => self.rrules.push(value.to_string()),
            "EXDATE" => self.exdates.extend(parse_time_list(property, &name, default_tz)?),
            "RDATE" => {
                if param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("PERIOD")) {
                    debug!("skipping RDATE with PERIOD values");
                } else {
                    self.rdates.extend(parse_time_list(property, &name, default_tz)?);
                }
            }
            "RECURRENCE-ID" => {
                self.recurrence_id = Some(parse_time(property, &name, value, default_tz)?);
            }
            "STATUS" => self.cancelled = value.eq_ignore_ascii_case("CANCELLED"),
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<VEvent> {
        let start = self.start.ok_or_else(|| {
            ServerTideError::CalendarParse(format!(
                "event '{}' has no DTSTART",
                self.uid.as_deref().unwrap_or(&self.summary)
            ))
        })?;

        Ok(VEvent {
            uid: self.uid,
            summary: self.summary,
            description: self.description,
            start,
            end: self.end,
            duration: self.duration,
            rrules: self.rrules,
            rdates: self.rdates,
            exdates: self.exdates,
            recurrence_id: self.recurrence_id,
            cancelled: self.cancelled,
        })
    }
}

fn parse_time_list(property: &Property<'_>, name: &str, default_tz: Tz) -> Result<Vec<IcalTime>> {
    property
        .val
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_time(property, name, value, default_tz))
        .collect()
}

fn parse_time(
    property: &Property<'_>,
    name: &str,
    value: &str,
    default_tz: Tz,
) -> Result<IcalTime> {
    let tz = match param(property, "TZID") {
        Some(tzid) => resolve_tzid(tzid, default_tz),
        None => default_tz,
    };

    let is_date = param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));
    if is_date {
        let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
            ServerTideError::CalendarParse(format!("{name}: invalid date '{value}': {e}"))
        })?;
        return Ok(IcalTime::Date { date, tz });
    }

    let (digits, utc) = match value.strip_suffix(['Z', 'z']) {
        Some(stripped) => (stripped, true),
        None => (value, false),
    };
    let naive = NaiveDateTime::parse_from_str(digits, DATE_TIME_FORMAT).map_err(|e| {
        ServerTideError::CalendarParse(format!("{name}: invalid date-time '{value}': {e}"))
    })?;

    Ok(if utc { IcalTime::Utc(naive) } else { IcalTime::Local { naive, tz } })
}

fn resolve_tzid(name: &str, default_tz: Tz) -> Tz {
    // Some producers prefix the IANA name with a path, e.g. /mozilla.org/.../Europe/Berlin
    let candidates = [name, name.trim_start_matches('/')];
    if let Some(tz) = candidates.iter().find_map(|candidate| candidate.parse::<Tz>().ok()) {
        return tz;
    }
    let suffix = name.rsplitn(3, '/').take(2).collect::<Vec<_>>();
    if suffix.len() == 2 {
        if let Ok(tz) = format!("{}/{}", suffix[1], suffix[0]).parse::<Tz>() {
            return tz;
        }
    }

    warn!(tzid = name, fallback = default_tz.name(), "unknown TZID, using configured timezone");
    default_tz
}

/// Parse an RFC 5545 `DURATION` value such as `PT1H30M`, `P1D` or `-P2W`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = || ServerTideError::CalendarParse(format!("invalid duration '{value}'"));

    let (negative, rest) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let rest = rest.strip_prefix(['P', 'p']).ok_or_else(invalid)?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut saw_component = false;

    for ch in rest.chars() {
        match ch.to_ascii_uppercase() {
            'T' => in_time = true,
            digit if digit.is_ascii_digit() => number.push(digit),
            unit => {
                let amount: i64 = number.parse().map_err(|_| invalid())?;
                number.clear();
                total += match (unit, in_time) {
                    ('W', false) => Duration::weeks(amount),
                    ('D', false) => Duration::days(amount),
                    ('H', true) => Duration::hours(amount),
                    ('M', true) => Duration::minutes(amount),
                    ('S', true) => Duration::seconds(amount),
                    _ => return Err(invalid()),
                };
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return Err(invalid());
    }
    Ok(if negative { -total } else { total })
}
