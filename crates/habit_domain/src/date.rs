//! Logical-day arithmetic.
//!
//! Completions are attributed to a "logical" day that rolls over at
//! [`DAY_ROLLOVER_HOUR`] instead of midnight, so someone still up at 2 AM is
//! completing the previous day's habits. The formatted logical date is the
//! partition key the habit API uses for completions.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{HabitError, Result};

/// Local hour at which the logical day advances to the calendar day.
pub const DAY_ROLLOVER_HOUR: u32 = 3;

const KEY_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_FORMAT: &str = "%a, %b %-d";

/// Logical date for the current local wall-clock time.
pub fn current_logical_date() -> NaiveDate {
    logical_date_at(Local::now().naive_local())
}

/// Logical date for a given local wall-clock instant.
pub fn logical_date_at(now: NaiveDateTime) -> NaiveDate {
    let calendar = now.date();
    if now.hour() < DAY_ROLLOVER_HOUR {
        previous_day(calendar)
    } else {
        calendar
    }
}

pub fn format_logical_date(date: NaiveDate) -> String {
    date.format(KEY_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` key. Short fields (`2023-1-5`) and impossible dates
/// (`2023-02-30`) are rejected.
pub fn parse_logical_date(input: &str) -> Result<NaiveDate> {
    let bytes = input.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_formed {
        return Err(HabitError::validation(format!(
            "invalid date `{input}`, expected YYYY-MM-DD"
        )));
    }
    NaiveDate::parse_from_str(input, KEY_FORMAT)
        .map_err(|err| HabitError::validation(format!("invalid date `{input}`: {err}")))
}

/// Short en-US display form, e.g. `Mon, Dec 25`.
pub fn format_date_for_display(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

/// "Today", "Yesterday" or the short display form, relative to the real
/// local calendar date.
pub fn label(date: NaiveDate) -> String {
    label_relative_to(date, Local::now().date_naive())
}

pub fn label_relative_to(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if is_yesterday_relative_to(date, today) {
        "Yesterday".to_string()
    } else {
        format_date_for_display(date)
    }
}

pub fn is_yesterday(date: NaiveDate) -> bool {
    is_yesterday_relative_to(date, Local::now().date_naive())
}

pub fn is_yesterday_relative_to(date: NaiveDate, today: NaiveDate) -> bool {
    today.pred_opt() == Some(date)
}

fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}
