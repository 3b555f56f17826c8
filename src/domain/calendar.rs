use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Whole days from `anchor` to `target`. Negative when `target` precedes `anchor`.
pub fn days_between(anchor: NaiveDate, target: NaiveDate) -> i64 {
    target.signed_duration_since(anchor).num_days()
}

/// Always-non-negative remainder. Returns `None` for a non-positive modulus.
pub fn euclid_mod(value: i64, modulus: i64) -> Option<i64> {
    if modulus <= 0 {
        return None;
    }
    Some(value.rem_euclid(modulus))
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from(days_between(first, next_first)).ok()
}

/// The `n`-th (1-based) `weekday` of the given month, or `None` when the month
/// has fewer occurrences.
pub fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    if n == 0 {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = euclid_mod(
        i64::from(weekday.num_days_from_monday()) - i64::from(first.weekday().num_days_from_monday()),
        7,
    )?;
    let candidate = first + Duration::days(offset + 7 * i64::from(n - 1));
    (candidate.month() == month).then_some(candidate)
}

pub fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let last_day = days_in_month(year, month)?;
    let last = NaiveDate::from_ymd_opt(year, month, last_day)?;
    let back = euclid_mod(
        i64::from(last.weekday().num_days_from_monday()) - i64::from(weekday.num_days_from_monday()),
        7,
    )?;
    Some(last - Duration::days(back))
}

/// Index convention used by stored weekday sets: 0 = Sunday .. 6 = Saturday.
pub fn weekday_from_index(index: i64) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let normalized = name.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "sun" | "sunday" => Some(Weekday::Sun),
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_short_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
