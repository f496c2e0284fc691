//! Fixed-width ISO-8601 UTC timestamps with millisecond precision.
//!
//! Output always looks like `2020-01-01T00:00:00.000Z`. The calendar part
//! (`2020-01-01T`) only changes once per day, so it is computed with `chrono`
//! and cached per thread; the time of day is written with plain arithmetic.
use core::cell::RefCell;

use chrono::{Datelike, NaiveDate};

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

#[derive(Debug)]
struct CachedDay {
    day: i64,
    prefix: String,
}

std::thread_local! {
    static CACHED_DAY: RefCell<CachedDay> = const {
        RefCell::new(CachedDay { day: i64::MIN, prefix: String::new() })
    };
}

/// Appends `epoch_millis` (milliseconds since the Unix epoch, UTC) to `dst`
/// as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Instants before 1970 are supported. Instants beyond the range `chrono`
/// can represent (roughly ±262,000 years) are clamped to that range's
/// first or last millisecond.
///
/// # Examples
///
/// ```rust
/// let mut out = String::new();
/// ecsjson::write_iso8601_millis(&mut out, 1_577_836_800_123);
/// assert_eq!(out, "2020-01-01T00:00:00.123Z");
/// ```
pub fn write_iso8601_millis(dst: &mut String, epoch_millis: i64) {
    let (day, millis_of_day) = clamp_to_calendar(
        epoch_millis.div_euclid(MILLIS_PER_DAY),
        epoch_millis.rem_euclid(MILLIS_PER_DAY),
    );

    let cached = CACHED_DAY.try_with(|cell| {
        let Ok(mut cached) = cell.try_borrow_mut() else {
            return false;
        };
        if cached.day != day {
            cached.prefix.clear();
            write_date_prefix(&mut cached.prefix, day);
            cached.day = day;
        }
        dst.push_str(&cached.prefix);
        true
    });
    if !matches!(cached, Ok(true)) {
        write_date_prefix(dst, day);
    }

    write_time_of_day(dst, millis_of_day);
}

/// Days since the epoch of `NaiveDate::MIN` and `NaiveDate::MAX`.
fn calendar_bounds() -> (i64, i64) {
    let days = |date: NaiveDate| i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE;
    (days(NaiveDate::MIN), days(NaiveDate::MAX))
}

fn clamp_to_calendar(day: i64, millis_of_day: i64) -> (i64, i64) {
    let (first, last) = calendar_bounds();
    if day < first {
        (first, 0)
    } else if day > last {
        (last, MILLIS_PER_DAY - 1)
    } else {
        (day, millis_of_day)
    }
}

fn date_of(day: i64) -> NaiveDate {
    i32::try_from(day + UNIX_EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .unwrap_or(if day < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

fn write_date_prefix(dst: &mut String, day: i64) {
    let date = date_of(day);
    let year = date.year();
    if year < 0 {
        dst.push('-');
    }
    push_padded(dst, year.unsigned_abs(), 4);
    dst.push('-');
    push_padded(dst, date.month(), 2);
    dst.push('-');
    push_padded(dst, date.day(), 2);
    dst.push('T');
}

fn write_time_of_day(dst: &mut String, millis_of_day: i64) {
    // 0 <= millis_of_day < MILLIS_PER_DAY, so every component fits in u32.
    let millis = u32::try_from(millis_of_day).unwrap_or(0);
    let hours = millis / 3_600_000;
    let minutes = millis / 60_000 % 60;
    let seconds = millis / 1_000 % 60;
    push_padded(dst, hours, 2);
    dst.push(':');
    push_padded(dst, minutes, 2);
    dst.push(':');
    push_padded(dst, seconds, 2);
    dst.push('.');
    push_padded(dst, millis % 1_000, 3);
    dst.push('Z');
}

/// Pushes `value` in decimal, left-padded with zeros to at least `width` digits.
fn push_padded(dst: &mut String, value: u32, width: u32) {
    let digits = value.checked_ilog10().unwrap_or(0) + 1;
    for _ in digits..width {
        dst.push('0');
    }
    let mut divisor = 10u32.pow(digits - 1);
    while divisor > 0 {
        dst.push(char::from(b'0' + u8::try_from(value / divisor % 10).unwrap_or(0)));
        divisor /= 10;
    }
}
