//! Value coercion for loosely formatted upload cells.
//!
//! Every helper resolves failure to a defined default (`0.0` or `None`); nothing
//! here can leak a NaN into aggregation.

use chrono::{NaiveDate, NaiveTime, TimeDelta, Timelike};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Canonical textual form of a calendar date, fixed per report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateStyle {
    /// `YYYY-MM-DD`
    Iso,
    /// `DD-MM-YYYY`
    #[default]
    DayMonthYear,
}

impl DateStyle {
    pub fn format(self, date: NaiveDate) -> String {
        match self {
            DateStyle::Iso => date.format("%Y-%m-%d").to_string(),
            DateStyle::DayMonthYear => date.format("%d-%m-%Y").to_string(),
        }
    }
}

/// Parses a numeric cell, stripping thousands separators and a trailing `%`.
/// Anything unparseable is `0.0`.
pub fn parse_number(raw: &str) -> f64 {
    parse_number_opt(raw).unwrap_or(0.0)
}

/// Like [`parse_number`] but distinguishes an absent value from zero.
pub fn parse_number_opt(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Day zero of the spreadsheet serial calendar (serial 25569 is 1970-01-01).
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Calendar date of an Excel serial number; the fractional part is ignored.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let days = TimeDelta::try_days(serial.floor() as i64)?;
    excel_epoch().checked_add_signed(days)
}

/// Time of day of an Excel serial number.
///
/// Works on the fractional day directly, so the result does not depend on the
/// host timezone.
pub fn excel_serial_to_time(serial: f64) -> Option<NaiveTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let fraction = serial - serial.floor();
    let total_seconds = (fraction * SECONDS_PER_DAY).round() as u32 % 86_400;
    NaiveTime::from_num_seconds_from_midnight_opt(total_seconds, 0)
}

/// Accepts `DD-MM-YYYY`, `DD/MM/YYYY`, `YYYY-MM-DD`, `YYYY/MM/DD`, a date followed
/// by a time part, or a bare Excel serial.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains('-') || trimmed.contains('/') {
        let date_part = trimmed.split_whitespace().next().unwrap_or(trimmed);
        return parse_separated_date(date_part).or_else(|| parse_separated_date(trimmed));
    }

    trimmed.parse::<f64>().ok().and_then(excel_serial_to_date)
}

fn parse_separated_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split(['-', '/']).map(str::trim).collect();
    if parts.len() != 3 {
        return None;
    }
    let nums: Vec<u32> = parts
        .iter()
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    if parts[0].len() == 4 {
        NaiveDate::from_ymd_opt(nums[0] as i32, nums[1], nums[2])
    } else {
        NaiveDate::from_ymd_opt(nums[2] as i32, nums[1], nums[0])
    }
}

/// Accepts `HH:MM`, `HH:MM:SS`, `h:MM AM`/`h:MMPM`, `<date> <time>`, or an Excel serial.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(serial) = trimmed.parse::<f64>() {
        return excel_serial_to_time(serial);
    }

    let mut text = trimmed;
    if let Some((head, rest)) = trimmed.split_once(char::is_whitespace) {
        let looks_like_date =
            (head.contains('/') || head.contains('-')) && head.chars().any(|c| c.is_ascii_digit());
        if looks_like_date {
            text = rest.trim();
        }
    }

    parse_clock(text)
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    let upper = text.to_ascii_uppercase();
    let (clock, meridiem) = if let Some(rest) = upper.strip_suffix("AM") {
        (rest.trim(), Some(false))
    } else if let Some(rest) = upper.strip_suffix("PM") {
        (rest.trim(), Some(true))
    } else {
        (upper.trim(), None)
    };

    let mut fields = clock.split(':');
    let hours: u32 = fields.next()?.trim().parse().ok()?;
    let minutes: u32 = fields.next()?.trim().parse().ok()?;
    let seconds: u32 = match fields.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };

    let hours = match meridiem {
        Some(pm) => {
            if hours == 0 || hours > 12 {
                return None;
            }
            (hours % 12) + if pm { 12 } else { 0 }
        }
        None => hours,
    };

    NaiveTime::from_hms_opt(hours, minutes, seconds)
}

/// `2:00 PM` style rendering.
pub fn format_time_12h(time: NaiveTime) -> String {
    let (pm, hour12) = time.hour12();
    format!("{}:{:02} {}", hour12, time.minute(), if pm { "PM" } else { "AM" })
}

/// Minutes from `start` to `end`, wrapping past midnight.
pub fn minutes_between(start: NaiveTime, end: NaiveTime) -> i64 {
    let diff = (end - start).num_minutes();
    if diff < 0 { diff + 24 * 60 } else { diff }
}

/// `45m` or `2h 5m`.
pub fn format_duration(minutes: i64) -> String {
    let h = minutes / 60;
    let m = minutes % 60;
    if h == 0 {
        format!("{m}m")
    } else {
        format!("{h}h {m}m")
    }
}

/// Natural ordering: digit runs compare numerically, letters case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ord = na
                    .trim_start_matches('0')
                    .len()
                    .cmp(&nb.trim_start_matches('0').len())
                    .then_with(|| na.trim_start_matches('0').cmp(nb.trim_start_matches('0')));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.to_lowercase().cmp(cb.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(iter: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = iter.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        iter.next();
    }
    out
}
