//! Provides calendar/scheduling utilities.
//! Parses and serializes venue opening-hours RRULEs with duration, provides
//! timeslot algebra, and maps per-day time bands to DST-safe UTC windows.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use iso8601_duration::Duration as Iso8601Duration;
pub use rrule::{RRuleSet, Tz as RRuleTz};
use std::cmp::{max, min};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::Sub;
use std::str::FromStr;

/// Upper bound on expanded occurrences per recurring event when covering a
/// trip window (7 days max, daily events)
const MAX_OCCURRENCES_PER_EVENT: u16 = 16;

/// A half-open window of absolute time
#[derive(Debug, Copy, Clone, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Timeslot {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

impl Timeslot {
    pub fn new(time_start: DateTime<Utc>, time_end: DateTime<Utc>) -> Self {
        Timeslot {
            time_start,
            time_end,
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// True if `other` lies entirely within this timeslot
    pub fn contains(&self, other: &Self) -> bool {
        self.time_start <= other.time_start && other.time_end <= self.time_end
    }

    /// True if the two windows share any time
    pub fn overlaps(&self, other: &Self) -> bool {
        self.time_start < other.time_end && other.time_start < self.time_end
    }
}

impl Sub for Timeslot {
    type Output = Vec<Timeslot>;

    /// Carve `blocked` out of this window. Whatever is left survives as at
    /// most two remainders, one on each side of the blocked range:
    ///
    ///   self:     |----------------|
    ///   blocked:        |-----|
    ///   result:   |-----|     |----|
    ///
    /// A disjoint `blocked` leaves the window untouched; a covering one
    /// leaves nothing.
    fn sub(self, blocked: Self) -> Self::Output {
        if !self.overlaps(&blocked) {
            return vec![self];
        }

        let mut remainders = Vec::with_capacity(2);
        if self.time_start < blocked.time_start {
            remainders.push(Timeslot::new(self.time_start, blocked.time_start));
        }
        if blocked.time_end < self.time_end {
            remainders.push(Timeslot::new(blocked.time_end, self.time_end));
        }

        remainders
    }
}

/// DTSTART/RDATE timestamps in the stored ical form, e.g. `20250101T070000Z`
fn ical_timestamp(dt: &DateTime<RRuleTz>) -> String {
    let stamp = dt.format("%Y%m%dT%H%M%S");
    match dt.timezone() {
        RRuleTz::Tz(chrono_tz::Tz::UTC) => format!("{}Z", stamp),
        RRuleTz::Tz(zone) => format!(";TZID={}:{}", zone.name(), stamp),
        RRuleTz::Local(_) => stamp.to_string(),
    }
}

/// Wraps an rruleset and its duration
#[derive(Debug, Clone)]
pub struct RecurrentEvent {
    /// The rruleset with recurrence rules
    pub rrule_set: RRuleSet,
    /// The duration of each occurrence
    pub duration: Duration,
}

/// Venue opening-hours calendar: recurring open windows using the rrule
/// crate and the iso8601_duration crate
#[derive(Debug, Clone)]
pub struct Calendar {
    /// Vec of rrulesets and their durations
    pub events: Vec<RecurrentEvent>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CalendarError {
    EmptyEvent,
    MissingDuration,
    BadDuration,
    BadRuleSet,
}

impl Display for CalendarError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            CalendarError::EmptyEvent => write!(f, "Event has no recurrence rules"),
            CalendarError::MissingDuration => write!(f, "Event header has no duration"),
            CalendarError::BadDuration => write!(f, "Unparseable event duration"),
            CalendarError::BadRuleSet => write!(f, "Unparseable recurrence rules"),
        }
    }
}

impl FromStr for Calendar {
    type Err = CalendarError;

    /// Parses the stored multiline form. Every event opens with a
    /// `DTSTART:<stamp>;DURATION:<iso8601>` header followed by its RRULE and
    /// RDATE lines. The rrule crate has no notion of event length, so the
    /// duration is peeled off the header before the rest is handed over.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut events = vec![];

        for block in text.split("DTSTART:").filter(|b| !b.trim().is_empty()) {
            let mut lines = block.lines();
            let header = lines.next().unwrap_or_default();

            let Some((start_stamp, duration_txt)) = header.split_once(";DURATION:") else {
                planner_error!("(from_str) event header has no duration: {}", header);
                return Err(CalendarError::MissingDuration);
            };

            let Some(duration) = duration_txt
                .trim()
                .parse::<Iso8601Duration>()
                .ok()
                .and_then(|d| d.to_chrono())
            else {
                planner_error!("(from_str) unparseable duration: {}", duration_txt);
                return Err(CalendarError::BadDuration);
            };

            let rules: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
            if rules.is_empty() {
                planner_error!("(from_str) event has no recurrence rules: {}", block);
                return Err(CalendarError::EmptyEvent);
            }

            let rrule_text = format!("DTSTART:{}\n{}", start_stamp, rules.join("\n"));
            let Ok(rrule_set) = RRuleSet::from_str(&rrule_text) else {
                planner_error!("(from_str) rrule rejected event: {}", rrule_text);
                return Err(CalendarError::BadRuleSet);
            };

            events.push(RecurrentEvent {
                rrule_set,
                duration,
            });
        }

        planner_debug!("(from_str) parsed calendar with {} events.", events.len());
        Ok(Calendar { events })
    }
}

impl Display for Calendar {
    /// Round-trips through the same multiline form `from_str` accepts
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for event in &self.events {
            writeln!(
                f,
                "DTSTART:{};DURATION:{}",
                ical_timestamp(event.rrule_set.get_dt_start()),
                event.duration
            )?;
            for rule in event.rrule_set.get_rrule() {
                writeln!(f, "RRULE:{}", rule)?;
            }
            for date in event.rrule_set.get_rdate() {
                writeln!(f, "RDATE:{}", ical_timestamp(date))?;
            }
        }

        Ok(())
    }
}

impl Calendar {
    /// Expands the calendar into open timeslots intersecting the given window,
    /// clamped to the window and sorted by start.
    pub fn open_slots(&self, time_start: &DateTime<Utc>, time_end: &DateTime<Utc>) -> Vec<Timeslot> {
        // Grab a full day either side so occurrences straddling the window
        // edges are not missed
        let probe_from = (*time_start).naive_utc() - Duration::days(1);
        let probe_to = (*time_end).naive_utc() + Duration::days(1);

        // convert to a Tz type understood by the rrule library
        let probe_from: DateTime<rrule::Tz> = rrule::Tz::UTC.from_utc_datetime(&probe_from);
        let probe_to: DateTime<rrule::Tz> = rrule::Tz::UTC.from_utc_datetime(&probe_to);

        let mut open = vec![];
        for event in &self.events {
            let occurrences = event.rrule_set.clone().after(probe_from).before(probe_to);
            for occurrence in occurrences.all(MAX_OCCURRENCES_PER_EVENT).dates {
                let opens_at = occurrence.with_timezone(&Utc);
                let closes_at = opens_at + event.duration;
                if opens_at >= *time_end || closes_at <= *time_start {
                    continue;
                }

                open.push(Timeslot {
                    time_start: max(opens_at, *time_start),
                    time_end: min(closes_at, *time_end),
                });
            }
        }

        open.sort_by_key(|ts| ts.time_start);
        open
    }

    /// True if the venue is open for the entirety of the given window
    pub fn is_open_during(&self, window: &Timeslot) -> bool {
        self.open_slots(&window.time_start, &window.time_end)
            .iter()
            .any(|open| open.duration() == window.duration())
    }
}

/// Per-day scheduling bands, expressed in the destination's wall clock
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBand {
    Morning,
    Midday,
    Afternoon,
    Evening,
}

impl TimeBand {
    /// All bands in chronological order
    pub const ALL: [TimeBand; 4] = [
        TimeBand::Morning,
        TimeBand::Midday,
        TimeBand::Afternoon,
        TimeBand::Evening,
    ];

    /// Default wall-clock window for the band: (start, end) as (hour, minute)
    pub fn wall_clock(&self) -> ((u32, u32), (u32, u32)) {
        match self {
            TimeBand::Morning => ((9, 0), (11, 30)),
            TimeBand::Midday => ((12, 0), (13, 15)),
            TimeBand::Afternoon => ((14, 0), (17, 30)),
            TimeBand::Evening => ((18, 30), (20, 30)),
        }
    }

    /// UTC window of this band on the given local date
    pub fn window(&self, date: NaiveDate, tz: Tz) -> Timeslot {
        let ((sh, sm), (eh, em)) = self.wall_clock();
        local_window(date, tz, (sh, sm), (eh, em))
    }
}

/// Resolves a local wall-clock time on a date to a UTC instant.
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times
/// skipped by a DST spring-forward shift one hour later so no ghost hour is
/// ever scheduled.
pub fn local_instant(date: NaiveDate, tz: Tz, hour: u32, minute: u32) -> DateTime<Utc> {
    let naive = date.and_time(
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
    );

    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            // The wall clock jumped over this time; the hour after the gap is
            // the first schedulable instant
            let shifted = naive + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
                chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
                chrono::LocalResult::None => Utc.from_utc_datetime(&shifted),
            }
        }
    }
}

/// UTC window for a local wall-clock range on a date
pub fn local_window(date: NaiveDate, tz: Tz, start: (u32, u32), end: (u32, u32)) -> Timeslot {
    let time_start = local_instant(date, tz, start.0, start.1);
    let mut time_end = local_instant(date, tz, end.0, end.1);

    // A fall-back transition can leave end <= start; keep the window well-formed
    if time_end <= time_start {
        time_end = time_start + Duration::minutes(30);
    }

    Timeslot {
        time_start,
        time_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CAL_OPEN_DAILY_9AM_6PM: &str = "DTSTART:20250101T090000Z;DURATION:PT9H\n\
    RRULE:FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR,SA,SU";

    const CAL_CLOSED_TUESDAYS: &str = "DTSTART:20250101T090000Z;DURATION:PT9H\n\
    RRULE:FREQ=WEEKLY;BYDAY=MO,WE,TH,FR,SA,SU";

    const INVALID_CALENDAR: &str = "DURATION:PT3H;DTSTART:20250101T090000Z;\n\
    RRULE:FREQ=WEEKLY;BYDAY=SA,SU";

    #[tokio::test]
    async fn test_parse_calendar() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_parse_calendar) Start.");

        let calendar = Calendar::from_str(CAL_OPEN_DAILY_9AM_6PM).unwrap();
        assert_eq!(calendar.events.len(), 1);
        assert_eq!(calendar.events[0].duration, Duration::hours(9));

        ut_info!("(test_parse_calendar) Success.");
    }

    #[tokio::test]
    async fn test_invalid_calendar() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_invalid_calendar) Start.");

        assert!(Calendar::from_str(INVALID_CALENDAR).is_err());

        // a header without rules is rejected too
        assert_eq!(
            Calendar::from_str("DTSTART:20250101T090000Z;DURATION:PT9H").unwrap_err(),
            CalendarError::EmptyEvent
        );
        assert_eq!(
            Calendar::from_str("DTSTART:20250101T090000Z;DURATION:whenever\nRRULE:x")
                .unwrap_err(),
            CalendarError::BadDuration
        );

        ut_info!("(test_invalid_calendar) Success.");
    }

    #[tokio::test]
    async fn test_save_and_load_calendar() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_save_and_load_calendar) Start.");

        let calendar = Calendar::from_str(CAL_CLOSED_TUESDAYS).unwrap();
        let cal_str = calendar.to_string();
        let calendar = Calendar::from_str(&cal_str).unwrap();
        assert_eq!(calendar.events.len(), 1);
        assert_eq!(calendar.events[0].duration, Duration::hours(9));

        ut_info!("(test_save_and_load_calendar) Success.");
    }

    #[tokio::test]
    async fn test_open_during() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_open_during) Start.");

        let calendar = Calendar::from_str(CAL_CLOSED_TUESDAYS).unwrap();

        // 2025-06-02 is a Monday: open
        let open = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 17, 30, 0).unwrap(),
        };
        assert!(calendar.is_open_during(&open));

        // 2025-06-03 is a Tuesday: closed
        let closed = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 3, 17, 30, 0).unwrap(),
        };
        assert!(!calendar.is_open_during(&closed));

        // Outside open hours on an open day
        let late = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 19, 0, 0).unwrap(),
        };
        assert!(!calendar.is_open_during(&late));

        ut_info!("(test_open_during) Success.");
    }

    #[tokio::test]
    async fn test_timeslot_sub() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_timeslot_sub) Start.");

        let base = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap(),
        };
        let middle = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 13, 0, 0).unwrap(),
        };

        // a block in the middle splits the window
        let parts = base - middle;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].time_end, middle.time_start);
        assert_eq!(parts[1].time_start, middle.time_end);

        // a block hanging over one edge leaves a single remainder
        let leading = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap(),
        };
        let parts = base - leading;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].time_start, leading.time_end);
        assert_eq!(parts[0].time_end, base.time_end);

        // disjoint subtraction is a no-op
        let disjoint = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 18, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 19, 0, 0).unwrap(),
        };
        assert_eq!((base - disjoint), vec![base]);

        // covering subtraction removes everything
        let covering = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap(),
        };
        assert!((base - covering).is_empty());

        ut_info!("(test_timeslot_sub) Success.");
    }

    #[tokio::test]
    async fn test_band_windows_dst() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_band_windows_dst) Start.");

        let tz: Tz = "Europe/Paris".parse().unwrap();

        // Ordinary summer day: 09:00 local is 07:00 UTC
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let window = TimeBand::Morning.window(date, tz);
        assert_eq!(
            window.time_start,
            Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
        );

        // Spring-forward day (2025-03-30, 02:00 -> 03:00): 02:30 does not
        // exist; it resolves one hour later instead of a ghost hour
        let dst_date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let shifted = local_instant(dst_date, tz, 2, 30);
        assert_eq!(
            shifted,
            Utc.with_ymd_and_hms(2025, 3, 30, 1, 30, 0).unwrap()
        );

        // Bands stay strictly ordered across the transition
        let mut previous: Option<Timeslot> = None;
        for band in TimeBand::ALL {
            let w = band.window(dst_date, tz);
            assert!(w.time_start < w.time_end);
            if let Some(prev) = previous {
                assert!(prev.time_end <= w.time_start);
            }
            previous = Some(w);
        }

        ut_info!("(test_band_windows_dst) Success.");
    }
}
