//! High/low tariff windows
//!
//! A [`TimeRange`] is a recurring window such as `07:00-20:00:Mon,Tue`.
//! Matching works on local wall-clock minutes: start inclusive, end
//! exclusive, and a range whose end lies before its start wraps past
//! midnight.

use crate::error::{EkzError, Result};
use chrono::{Datelike, Duration, Local, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Recurring window of the day, optionally limited to some weekdays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    /// Empty means every day
    pub weekdays: Vec<Weekday>,
}

impl TimeRange {
    pub fn new(start: (u32, u32), end: (u32, u32), weekdays: Vec<Weekday>) -> Result<Self> {
        check_time("start", start)?;
        check_time("end", end)?;
        Ok(Self {
            start_hour: start.0,
            start_minute: start.1,
            end_hour: end.0,
            end_minute: end.1,
            weekdays,
        })
    }

    pub fn start_minutes(&self) -> u32 {
        self.start_hour * 60 + self.start_minute
    }

    pub fn end_minutes(&self) -> u32 {
        self.end_hour * 60 + self.end_minute
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end_minutes() < self.start_minutes()
    }

    /// Whether `at` falls inside this window
    ///
    /// The weekday filter applies to the day `at` is on, also for the
    /// early-morning part of a range that started the evening before.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        if !self.weekdays.is_empty() && !self.weekdays.contains(&at.weekday()) {
            return false;
        }

        let current = at.hour() * 60 + at.minute();
        let (start, end) = (self.start_minutes(), self.end_minutes());
        if end < start {
            current >= start || current < end
        } else {
            start <= current && current < end
        }
    }
}

fn check_time(which: &str, (hour, minute): (u32, u32)) -> Result<()> {
    if hour > 23 {
        return Err(EkzError::validation(
            "time_range",
            &format!("{} hour {} is out of range 0-23", which, hour),
        ));
    }
    if minute > 59 {
        return Err(EkzError::validation(
            "time_range",
            &format!("{} minute {} is out of range 0-59", which, minute),
        ));
    }
    Ok(())
}

fn parse_clock(which: &str, hour: &str, minute: &str) -> Result<(u32, u32)> {
    let hour = hour.trim().parse::<u32>().map_err(|_| {
        EkzError::validation("time_range", &format!("invalid {} hour: {:?}", which, hour))
    })?;
    let minute = minute.trim().parse::<u32>().map_err(|_| {
        EkzError::validation(
            "time_range",
            &format!("invalid {} minute: {:?}", which, minute),
        )
    })?;
    Ok((hour, minute))
}

fn parse_weekday(name: &str) -> Result<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(EkzError::validation(
            "time_range",
            &format!("invalid weekday: {:?}", other),
        )),
    }
}

impl FromStr for TimeRange {
    type Err = EkzError;

    /// `HH:MM-HH:MM` or `HH:MM-HH:MM:Day,Day,...`
    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || EkzError::validation("time_range", &format!("invalid time range format: {:?}", s));

        let (start, rest) = s.trim().split_once('-').ok_or_else(invalid)?;
        let (start_hour, start_minute) = start.split_once(':').ok_or_else(invalid)?;

        let mut end_parts = rest.splitn(3, ':');
        let end_hour = end_parts.next().ok_or_else(invalid)?;
        let end_minute = end_parts.next().ok_or_else(invalid)?;
        let weekdays = match end_parts.next() {
            None => Vec::new(),
            Some(days) if days.trim().is_empty() => return Err(invalid()),
            Some(days) => days
                .split(',')
                .map(parse_weekday)
                .collect::<Result<Vec<_>>>()?,
        };

        Self::new(
            parse_clock("start", start_hour, start_minute)?,
            parse_clock("end", end_hour, end_minute)?,
            weekdays,
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start_hour, self.start_minute, self.end_hour, self.end_minute
        )?;
        if !self.weekdays.is_empty() {
            let days: Vec<String> = self.weekdays.iter().map(|d| d.to_string()).collect();
            write!(f, ":{}", days.join(","))?;
        }
        Ok(())
    }
}

/// EKZ high tariff: Monday to Friday, 07:00-20:00
pub fn default_high_tariff_schedule() -> Vec<TimeRange> {
    vec![TimeRange {
        start_hour: 7,
        start_minute: 0,
        end_hour: 20,
        end_minute: 0,
        weekdays: vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ],
    }]
}

/// Set of high-tariff windows evaluated in one time zone
#[derive(Debug, Clone)]
pub struct TariffSchedule {
    high_tariff: Vec<TimeRange>,
    time_zone: Option<Tz>,
}

impl Default for TariffSchedule {
    fn default() -> Self {
        Self::new(default_high_tariff_schedule(), None)
    }
}

impl TariffSchedule {
    /// `time_zone` of `None` means the system local zone
    pub fn new(high_tariff: Vec<TimeRange>, time_zone: Option<Tz>) -> Self {
        Self {
            high_tariff,
            time_zone,
        }
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.high_tariff
    }

    /// Current wall-clock time in the schedule's zone
    pub fn now(&self) -> NaiveDateTime {
        match self.time_zone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }

    pub fn is_high_tariff(&self, at: NaiveDateTime) -> bool {
        self.high_tariff.iter().any(|range| range.matches(at))
    }

    /// First instant at or after `from` that is low tariff.
    ///
    /// Scans forward minute by minute for at most one day, which costs
    /// `ranges x 1440` checks; falls back to `from + 24h`.
    pub fn next_low_tariff(&self, from: NaiveDateTime) -> NaiveDateTime {
        if !self.is_high_tariff(from) {
            return from;
        }

        let minute_start = from
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(from);
        (1..=MINUTES_PER_DAY)
            .map(|step| minute_start + Duration::minutes(i64::from(step)))
            .find(|candidate| !self.is_high_tariff(*candidate))
            .unwrap_or_else(|| from + Duration::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-01-01 is a Monday
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn parses_plain_range() {
        let range: TimeRange = "7:00-20:30".parse().unwrap();
        assert_eq!((range.start_hour, range.start_minute), (7, 0));
        assert_eq!((range.end_hour, range.end_minute), (20, 30));
        assert!(range.weekdays.is_empty());
    }

    #[test]
    fn parses_weekdays_case_insensitive() {
        let range: TimeRange = "22:00-06:00:mon,TUESDAY, Sun".parse().unwrap();
        assert_eq!(
            range.weekdays,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Sun]
        );
        assert!(range.crosses_midnight());
        assert_eq!(range.to_string(), "22:00-06:00:Mon,Tue,Sun");
    }

    #[test]
    fn rejects_malformed_ranges() {
        for input in [
            "",
            "07:00",
            "07-20",
            "07:00-20",
            "24:00-06:00",
            "07:60-08:00",
            "07:00-20:00:",
            "07:00-20:00:Funday",
            "aa:00-20:00",
        ] {
            assert!(input.parse::<TimeRange>().is_err(), "{input:?} parsed");
        }
    }

    #[test]
    fn default_schedule_scenario() {
        let schedule = TariffSchedule::default();
        assert!(!schedule.is_high_tariff(at(1, 6, 59)));
        assert!(schedule.is_high_tariff(at(1, 7, 0)));
        assert!(schedule.is_high_tariff(at(1, 19, 59)));
        assert!(!schedule.is_high_tariff(at(1, 20, 0)));
        // Saturday
        assert!(!schedule.is_high_tariff(at(6, 9, 0)));
    }

    #[test]
    fn midnight_crossing_boundaries() {
        let range: TimeRange = "22:00-06:00".parse().unwrap();
        assert!(range.matches(at(1, 22, 0)));
        assert!(range.matches(at(2, 0, 0)));
        assert!(range.matches(at(2, 5, 59)));
        assert!(!range.matches(at(2, 6, 0)));
        assert!(!range.matches(at(1, 21, 59)));
    }

    #[test]
    fn equal_start_and_end_never_matches() {
        let range: TimeRange = "08:00-08:00".parse().unwrap();
        assert!(!range.matches(at(1, 8, 0)));
        assert!(!range.matches(at(1, 12, 0)));
    }

    #[test]
    fn ranges_are_or_combined() {
        let schedule = TariffSchedule::new(
            vec![
                "06:00-18:00".parse().unwrap(),
                "18:00-06:00".parse().unwrap(),
            ],
            None,
        );
        for minute in (0..MINUTES_PER_DAY).step_by(7) {
            assert!(schedule.is_high_tariff(at(3, minute / 60, minute % 60)));
        }
    }

    #[test]
    fn next_low_tariff_when_already_low() {
        let schedule = TariffSchedule::default();
        assert_eq!(schedule.ranges(), default_high_tariff_schedule().as_slice());
        let now = at(1, 21, 15);
        assert_eq!(schedule.next_low_tariff(now), now);
    }

    #[test]
    fn next_low_tariff_finds_window_end() {
        let schedule = TariffSchedule::default();
        let now = at(1, 9, 30) + Duration::seconds(42);
        assert_eq!(schedule.next_low_tariff(now), at(1, 20, 0));
    }

    #[test]
    fn next_low_tariff_falls_back_to_one_day() {
        let schedule = TariffSchedule::new(vec!["00:00-00:00".parse().unwrap()], None);
        // empty range: always low
        let now = at(2, 3, 0);
        assert_eq!(schedule.next_low_tariff(now), now);

        let always = TariffSchedule::new(
            vec![
                "00:00-12:00".parse().unwrap(),
                "12:00-00:00".parse().unwrap(),
            ],
            None,
        );
        assert_eq!(always.next_low_tariff(now), now + Duration::hours(24));
    }
}
