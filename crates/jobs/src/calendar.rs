//! Date arithmetic shared by the grant jobs: anniversary windows, fiscal
//! years, and calendar quarters.

use chrono::{Datelike, Months, NaiveDate};

/// Full months elapsed between two dates; a partial month does not count.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    if end < start {
        return 0;
    }
    let mut months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0)
}

/// The one-month window ending yesterday, used for the anniversary
/// attendance gate: `[today - 1 month, today - 1 day]`.
pub fn anniversary_window_ending(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today.checked_sub_months(Months::new(1)).unwrap_or(today);
    let end = today.pred_opt().unwrap_or(today);
    (start, end)
}

pub fn fiscal_year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

pub fn fiscal_year_end(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date)
}

pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = ((date.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// Last day of the quarter containing `date`.
pub fn quarter_end(date: NaiveDate) -> NaiveDate {
    let start = quarter_start(date);
    start
        .checked_add_months(Months::new(3))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// The quarter immediately before the one containing `date`, as an
/// inclusive `(start, end)` pair.
pub fn previous_quarter(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let current_start = quarter_start(date);
    let end = current_start.pred_opt().unwrap_or(date);
    (quarter_start(end), end)
}

/// Last day of the quarter after the one containing `date`.
pub fn next_quarter_end(date: NaiveDate) -> NaiveDate {
    quarter_start(date)
        .checked_add_months(Months::new(3))
        .map(quarter_end)
        .unwrap_or(date)
}
