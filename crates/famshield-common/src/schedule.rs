// Schedule window evaluation
//
// Parses the "HH:mm" start/end strings and weekday lists carried by rules and
// answers whether a window is active at a given local time. Windows whose end
// precedes their start wrap past midnight.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use tracing::warn;

use crate::types::Rule;

/// A parsed, always-valid schedule window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    /// Bit `n` set means weekday index `n` (0 = Monday). `None` means every day.
    days: Option<u8>,
    start: NaiveTime,
    end: NaiveTime,
}

impl ScheduleWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { days: None, start, end }
    }

    pub fn with_days(mut self, days: &[Weekday]) -> Self {
        if days.is_empty() {
            self.days = None;
        } else {
            self.days = Some(days.iter().fold(0u8, |mask, d| mask | (1 << weekday_index(*d))));
        }
        self
    }

    /// Build the window described by a rule.
    ///
    /// Returns `None` when the rule has no window or any part of it is
    /// malformed, which leaves the rule inert.
    pub fn from_rule(rule: &Rule) -> Option<Self> {
        let start = parse_time(rule.schedule_start.as_deref()?)?;
        let end = parse_time(rule.schedule_end.as_deref()?)?;

        let days = match rule.schedule_days.as_deref() {
            None | Some([]) => None,
            Some(indices) => {
                let mask = indices
                    .iter()
                    .filter(|&&i| i <= 6)
                    .fold(0u8, |mask, &i| mask | (1 << i));
                if mask == 0 {
                    warn!("Rule {} has no valid schedule days {:?}", rule.id, indices);
                    return None;
                }
                Some(mask)
            }
        };

        Some(Self { days, start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    pub fn applies_on(&self, day: Weekday) -> bool {
        match self.days {
            None => true,
            Some(mask) => mask & (1 << weekday_index(day)) != 0,
        }
    }

    /// Whether a time of day falls in `[start, end)`, wrapping past midnight
    /// when `end < start`. A zero-length window never matches.
    pub fn contains_time(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            time >= self.start && time < self.end
        } else if self.start > self.end {
            time >= self.start || time < self.end
        } else {
            false
        }
    }

    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.applies_on(now.weekday()) && self.contains_time(now.time())
    }

    /// Human readable "HH:mm-HH:mm" form used in block overlays.
    pub fn label(&self) -> String {
        format!(
            "{:02}:{:02}-{:02}:{:02}",
            self.start.hour(),
            self.start.minute(),
            self.end.hour(),
            self.end.minute()
        )
    }
}

/// Parse an "HH:mm" string, returning `None` for anything malformed.
pub fn parse_time(time_str: &str) -> Option<NaiveTime> {
    match NaiveTime::parse_from_str(time_str.trim(), "%H:%M") {
        Ok(time) => Some(time),
        Err(e) => {
            warn!("Invalid schedule time {:?}: {}", time_str, e);
            None
        }
    }
}

/// Weekday index as used on the wire, 0 = Monday.
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_monday() as u8
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::types::RuleType;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        // 2026-01-19 is a Monday
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn window(start: &str, end: &str) -> ScheduleWindow {
        ScheduleWindow::from_rule(&Rule::new("s", RuleType::Schedule).with_window(start, end))
            .unwrap()
    }

    #[test]
    fn test_parse_time() {
        assert!(parse_time("10:00").is_some());
        assert!(parse_time("23:59").is_some());
        assert!(parse_time(" 00:00 ").is_some());
        assert!(parse_time("25:00").is_none());
        assert!(parse_time("invalid").is_none());
    }

    #[test]
    fn test_daytime_window_is_half_open() {
        let w = window("08:00", "12:00");
        assert!(!w.contains_time(NaiveTime::from_hms_opt(7, 59, 0).unwrap()));
        assert!(w.contains_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(w.contains_time(NaiveTime::from_hms_opt(11, 59, 0).unwrap()));
        assert!(!w.contains_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_overnight_window_wraps() {
        let w = window("21:00", "07:00");
        assert!(w.wraps_midnight());
        assert!(w.contains_time(NaiveTime::from_hms_opt(21, 0, 0).unwrap()));
        assert!(w.contains_time(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(w.contains_time(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
        assert!(!w.contains_time(NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(!w.contains_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_zero_length_window_never_active() {
        let w = window("10:00", "10:00");
        assert!(!w.contains_time(NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert!(!w.contains_time(NaiveTime::from_hms_opt(22, 0, 0).unwrap()));
    }

    #[test]
    fn test_days_restrict_activity() {
        let rule =
            Rule::new("s", RuleType::Schedule).with_window("08:00", "12:00").with_days(&[0, 2]);
        let w = ScheduleWindow::from_rule(&rule).unwrap();

        assert!(w.is_active_at(at(19, 9, 0))); // Monday
        assert!(!w.is_active_at(at(20, 9, 0))); // Tuesday
        assert!(w.is_active_at(at(21, 9, 0))); // Wednesday
    }

    #[test]
    fn test_empty_days_means_every_day() {
        let rule = Rule::new("s", RuleType::Schedule).with_window("08:00", "12:00").with_days(&[]);
        let w = ScheduleWindow::from_rule(&rule).unwrap();
        for day in 19..=25 {
            assert!(w.is_active_at(at(day, 10, 0)));
        }
    }

    #[test]
    fn test_malformed_rule_has_no_window() {
        let rule = Rule::new("s", RuleType::Schedule).with_window("8 o'clock", "12:00");
        assert!(ScheduleWindow::from_rule(&rule).is_none());

        let rule = Rule::new("s", RuleType::Schedule).with_window("08:00", "12:00").with_days(&[9]);
        assert!(ScheduleWindow::from_rule(&rule).is_none());

        let mut rule = Rule::new("s", RuleType::Schedule);
        rule.schedule_start = Some("08:00".into());
        assert!(ScheduleWindow::from_rule(&rule).is_none());
    }

    #[test]
    fn test_label() {
        assert_eq!(window("21:00", "07:30").label(), "21:00-07:30");
    }

    #[test]
    fn test_with_days_builder() {
        let w = ScheduleWindow::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        )
        .with_days(&[Weekday::Sat, Weekday::Sun]);
        assert!(w.applies_on(Weekday::Sun));
        assert!(!w.applies_on(Weekday::Mon));
        assert_eq!(weekday_index(Weekday::Sun), 6);
    }
}
