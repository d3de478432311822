use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};

use crate::dates::BUSINESS_UTC_OFFSET_HOURS;

/// Current instant in the business timezone, as a naive datetime.
pub fn business_now() -> NaiveDateTime {
    Utc::now().naive_utc() + Duration::hours(BUSINESS_UTC_OFFSET_HOURS)
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// Inclusive date range. KPI values are always reported as a pair of these,
/// previous vs current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Column label for this window: the month name of the window start.
    /// The current window reports under the current month's name even though
    /// its end date is mid-month.
    pub fn label(&self) -> String {
        self.start.format("%B").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyWindows {
    pub previous: Window,
    pub current: Window,
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Full previous calendar month vs current month-to-date, anchored at `now`.
pub fn monthly_windows(now: NaiveDateTime) -> MonthlyWindows {
    let today = now.date();
    let current_start = ymd(today.year(), today.month(), 1);
    let (prev_year, prev_month) = previous_month(today.year(), today.month());
    let previous_start = ymd(prev_year, prev_month, 1);
    let previous_end = ymd(prev_year, prev_month, days_in_month(prev_year, prev_month));
    MonthlyWindows {
        previous: Window::new(previous_start, previous_end),
        current: Window::new(current_start, today),
    }
}

// ---------------------------------------------------------------------------
// Weekday-aligned daily comparison
// ---------------------------------------------------------------------------

fn first_weekday_day(year: i32, month: u32, weekday: Weekday) -> u32 {
    let first = ymd(year, month, 1);
    let offset = (weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    1 + offset
}

fn last_weekday_day(year: i32, month: u32, weekday: Weekday) -> u32 {
    let last_day = days_in_month(year, month);
    let last = ymd(year, month, last_day);
    let offset = (last.weekday().num_days_from_monday() + 7 - weekday.num_days_from_monday()) % 7;
    last_day - offset
}

/// Day of the Nth occurrence of `weekday` in the month, falling back to the
/// last occurrence when the month has fewer than N.
fn nth_weekday_day(year: i32, month: u32, weekday: Weekday, n: u32) -> u32 {
    let day = first_weekday_day(year, month, weekday) + (n - 1) * 7;
    if day <= days_in_month(year, month) {
        day
    } else {
        last_weekday_day(year, month, weekday)
    }
}

/// Today plus the comparable day in the previous month: the same Nth
/// occurrence of today's weekday, last occurrence when the ordinal does not
/// exist there.
pub fn daily_windows(now: NaiveDateTime) -> (NaiveDate, NaiveDate) {
    let today = now.date();
    let weekday = today.weekday();
    let first = first_weekday_day(today.year(), today.month(), weekday);
    let nth = 1 + today.day().saturating_sub(first) / 7;

    let (prev_year, prev_month) = previous_month(today.year(), today.month());
    let day = nth_weekday_day(prev_year, prev_month, weekday, nth);
    (today, ymd(prev_year, prev_month, day))
}

/// Earliest date any KPI window needs: one fetch starting here refreshes the
/// monthly pair and the daily comparison.
pub fn required_start_date(now: NaiveDateTime) -> NaiveDate {
    let (_, comparable) = daily_windows(now);
    let windows = monthly_windows(now);
    comparable.min(windows.previous.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_windows_mid_month() {
        let windows = monthly_windows(at(2025, 5, 15));
        assert_eq!(windows.previous, Window::new(date(2025, 4, 1), date(2025, 4, 30)));
        assert_eq!(windows.current, Window::new(date(2025, 5, 1), date(2025, 5, 15)));
        assert_eq!(windows.previous.label(), "April");
        assert_eq!(windows.current.label(), "May");
    }

    #[test]
    fn test_monthly_windows_january_wraps_year() {
        let windows = monthly_windows(at(2025, 1, 10));
        assert_eq!(windows.previous, Window::new(date(2024, 12, 1), date(2024, 12, 31)));
        assert_eq!(windows.current, Window::new(date(2025, 1, 1), date(2025, 1, 10)));
    }

    #[test]
    fn test_daily_windows_same_ordinal() {
        // 2025-06-09 is the 2nd Monday of June; 2nd Monday of May is the 12th.
        let (today, comparable) = daily_windows(at(2025, 6, 9));
        assert_eq!(today, date(2025, 6, 9));
        assert_eq!(comparable, date(2025, 5, 12));
    }

    #[test]
    fn test_daily_windows_fifth_occurrence_falls_back_to_last() {
        // 2025-06-30 is the 5th Monday of June; May 2025 has only four, the
        // last being the 26th.
        let (_, comparable) = daily_windows(at(2025, 6, 30));
        assert_eq!(comparable, date(2025, 5, 26));
    }

    #[test]
    fn test_required_start_date_covers_both_lookbacks() {
        assert_eq!(required_start_date(at(2025, 6, 30)), date(2025, 5, 1));
    }

    #[test]
    fn test_window_contains_is_inclusive() {
        let window = Window::new(date(2025, 4, 1), date(2025, 4, 30));
        assert!(window.contains(date(2025, 4, 1)));
        assert!(window.contains(date(2025, 4, 30)));
        assert!(!window.contains(date(2025, 5, 1)));
        assert!(!window.contains(date(2025, 3, 31)));
    }
}
