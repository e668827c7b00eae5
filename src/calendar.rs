//! Trading calendar implementation

use crate::error::{PipelineError, Result};
use crate::types::SessionDate;
use chrono::{Datelike, Duration, Weekday};

/// Trading calendar trait
pub trait TradingCalendar: Send + Sync {
    /// Check if a date is a trading session
    fn is_session(&self, date: SessionDate) -> bool;

    /// Get the next session after the given date
    fn next_session(&self, date: SessionDate) -> Result<SessionDate> {
        let mut current = date + Duration::days(1);
        for _ in 0..365 {
            if self.is_session(current) {
                return Ok(current);
            }
            current = current + Duration::days(1);
        }
        Err(PipelineError::CalendarError(format!(
            "No session found within 365 days after {}",
            date
        )))
    }

    /// Get the previous session before the given date
    fn previous_session(&self, date: SessionDate) -> Result<SessionDate> {
        let mut current = date - Duration::days(1);
        for _ in 0..365 {
            if self.is_session(current) {
                return Ok(current);
            }
            current = current - Duration::days(1);
        }
        Err(PipelineError::CalendarError(format!(
            "No session found within 365 days before {}",
            date
        )))
    }

    /// Get all sessions between two dates (inclusive)
    fn sessions_in_range(&self, start: SessionDate, end: SessionDate) -> Vec<SessionDate> {
        let mut days = Vec::new();
        let mut current = start;

        while current <= end {
            if self.is_session(current) {
                days.push(current);
            }
            current = current + Duration::days(1);
        }

        days
    }

    /// Up to `count` sessions strictly before `date`, ascending.
    ///
    /// Returns fewer when the calendar runs out of history.
    fn sessions_before(&self, date: SessionDate, count: usize) -> Vec<SessionDate> {
        let mut sessions = Vec::with_capacity(count);
        let mut current = date;

        while sessions.len() < count {
            match self.previous_session(current) {
                Ok(prev) => {
                    sessions.push(prev);
                    current = prev;
                }
                Err(_) => break,
            }
        }

        sessions.reverse();
        sessions
    }
}

/// Monday-to-Friday calendar with an optional holiday list
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: Vec<SessionDate>,
}

impl WeekdayCalendar {
    /// Create a calendar with no holidays
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calendar with the given holidays
    pub fn with_holidays(mut holidays: Vec<SessionDate>) -> Self {
        holidays.sort();
        holidays.dedup();
        Self { holidays }
    }

    /// Add a custom holiday
    pub fn add_holiday(&mut self, date: SessionDate) {
        if let Err(pos) = self.holidays.binary_search(&date) {
            self.holidays.insert(pos, date);
        }
    }

    fn is_weekend(date: SessionDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn is_session(&self, date: SessionDate) -> bool {
        !Self::is_weekend(date) && self.holidays.binary_search(&date).is_err()
    }
}

/// Calendar backed by an explicit list of sessions
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    sessions: Vec<SessionDate>,
}

impl SessionCalendar {
    pub fn new(mut sessions: Vec<SessionDate>) -> Self {
        sessions.sort();
        sessions.dedup();
        Self { sessions }
    }

    pub fn sessions(&self) -> &[SessionDate] {
        &self.sessions
    }
}

impl TradingCalendar for SessionCalendar {
    fn is_session(&self, date: SessionDate) -> bool {
        self.sessions.binary_search(&date).is_ok()
    }

    fn next_session(&self, date: SessionDate) -> Result<SessionDate> {
        let idx = self.sessions.partition_point(|s| *s <= date);
        self.sessions
            .get(idx)
            .copied()
            .ok_or_else(|| PipelineError::CalendarError(format!("No session after {}", date)))
    }

    fn previous_session(&self, date: SessionDate) -> Result<SessionDate> {
        let idx = self.sessions.partition_point(|s| *s < date);
        if idx == 0 {
            return Err(PipelineError::CalendarError(format!(
                "No session before {}",
                date
            )));
        }
        Ok(self.sessions[idx - 1])
    }

    fn sessions_in_range(&self, start: SessionDate, end: SessionDate) -> Vec<SessionDate> {
        let lo = self.sessions.partition_point(|s| *s < start);
        let hi = self.sessions.partition_point(|s| *s <= end);
        if lo >= hi {
            return Vec::new();
        }
        self.sessions[lo..hi].to_vec()
    }

    fn sessions_before(&self, date: SessionDate, count: usize) -> Vec<SessionDate> {
        let hi = self.sessions.partition_point(|s| *s < date);
        let lo = hi.saturating_sub(count);
        self.sessions[lo..hi].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> SessionDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekday_calendar() {
        let calendar = WeekdayCalendar::with_holidays(vec![d(2024, 1, 1)]);

        assert!(calendar.is_session(d(2024, 1, 8)));
        assert!(!calendar.is_session(d(2024, 1, 6)));
        assert!(!calendar.is_session(d(2024, 1, 1)));
    }

    #[test]
    fn test_next_and_previous_session() {
        let calendar = WeekdayCalendar::new();
        let friday = d(2024, 1, 5);
        let monday = d(2024, 1, 8);

        assert_eq!(calendar.next_session(friday).unwrap(), monday);
        assert_eq!(calendar.previous_session(monday).unwrap(), friday);
    }

    #[test]
    fn test_sessions_in_range() {
        let calendar = WeekdayCalendar::new();
        let days = calendar.sessions_in_range(d(2024, 1, 8), d(2024, 1, 14));
        assert_eq!(days.len(), 5);
        assert_eq!(days[0], d(2024, 1, 8));
    }

    #[test]
    fn test_sessions_before_skips_weekend() {
        let calendar = WeekdayCalendar::new();
        let before = calendar.sessions_before(d(2024, 1, 9), 3);
        assert_eq!(before, vec![d(2024, 1, 4), d(2024, 1, 5), d(2024, 1, 8)]);
    }

    #[test]
    fn test_session_calendar_runs_out_of_history() {
        let calendar = SessionCalendar::new(vec![d(2024, 1, 3), d(2024, 1, 2), d(2024, 1, 4)]);

        assert_eq!(calendar.sessions_before(d(2024, 1, 4), 10).len(), 2);
        assert!(calendar.previous_session(d(2024, 1, 2)).is_err());
        assert_eq!(calendar.next_session(d(2024, 1, 2)).unwrap(), d(2024, 1, 3));
        assert_eq!(
            calendar.sessions_in_range(d(2024, 1, 3), d(2024, 1, 31)),
            vec![d(2024, 1, 3), d(2024, 1, 4)]
        );
    }
}
