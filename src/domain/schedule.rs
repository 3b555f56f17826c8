use crate::domain::calendar::{
    days_between, euclid_mod, last_weekday_of_month, nth_weekday_of_month, parse_date,
    weekday_from_index, weekday_from_name, weekday_name, weekday_short_name,
};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const MAX_WEEK_ORDINAL: u8 = 5;

/// Which occurrence of a weekday inside a month. `-1` on the wire means the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum WeekOrdinal {
    Nth(u8),
    Last,
}

impl TryFrom<i8> for WeekOrdinal {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Last),
            1..=5 => Ok(Self::Nth(value as u8)),
            other => Err(format!("weekNum must be 1..=5 or -1, got {other}")),
        }
    }
}

impl From<WeekOrdinal> for i8 {
    fn from(value: WeekOrdinal) -> Self {
        match value {
            WeekOrdinal::Nth(n) => n as i8,
            WeekOrdinal::Last => -1,
        }
    }
}

impl WeekOrdinal {
    fn label(self) -> &'static str {
        match self {
            Self::Nth(1) => "1st",
            Self::Nth(2) => "2nd",
            Self::Nth(3) => "3rd",
            Self::Nth(4) => "4th",
            Self::Nth(5) => "5th",
            Self::Nth(_) => "?",
            Self::Last => "Last",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SchedulingConfig {
    #[default]
    Daily,
    Weekly {
        days: Vec<Weekday>,
    },
    Monthly {
        day_of_month: u32,
    },
    MonthlyRelative {
        week_num: WeekOrdinal,
        weekday: Weekday,
    },
    Interval {
        every_days: u32,
    },
    Cycle {
        on_days: u32,
        off_days: u32,
    },
}

impl SchedulingConfig {
    pub fn is_daily(&self) -> bool {
        matches!(self, Self::Daily)
    }

    /// Shapes that cannot be evaluated literally and therefore behave as daily.
    pub(crate) fn is_degenerate(&self) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekly { days } => days.is_empty(),
            Self::Monthly { day_of_month } => !(1..=31).contains(day_of_month),
            Self::MonthlyRelative { week_num, .. } => {
                matches!(week_num, WeekOrdinal::Nth(n) if *n == 0 || *n > MAX_WEEK_ORDINAL)
            }
            Self::Interval { every_days } => *every_days == 0,
            Self::Cycle { on_days, .. } => *on_days == 0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Daily | Self::Weekly { .. } => Ok(()),
            Self::Monthly { day_of_month } => {
                if !(1..=31).contains(day_of_month) {
                    return Err("schedule.dayOfMonth must be 1..=31".to_string());
                }
                Ok(())
            }
            Self::MonthlyRelative { week_num, .. } => match week_num {
                WeekOrdinal::Nth(n) if *n == 0 || *n > MAX_WEEK_ORDINAL => {
                    Err("schedule.weekNum must be 1..=5 or -1".to_string())
                }
                _ => Ok(()),
            },
            Self::Interval { every_days } => {
                if *every_days == 0 {
                    return Err("schedule.everyDays must be >= 1".to_string());
                }
                Ok(())
            }
            Self::Cycle { on_days, .. } => {
                if *on_days == 0 {
                    return Err("schedule.onDays must be >= 1".to_string());
                }
                Ok(())
            }
        }
    }

    pub fn describe(&self) -> String {
        if self.is_degenerate() {
            return "Every day".to_string();
        }
        match self {
            Self::Daily => "Every day".to_string(),
            Self::Weekly { days } => {
                let mut sorted = days.clone();
                sorted.sort_by_key(Weekday::num_days_from_monday);
                sorted.dedup();
                sorted
                    .into_iter()
                    .map(weekday_short_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            Self::Monthly { day_of_month } => format!("Day {day_of_month} of each month"),
            Self::MonthlyRelative { week_num, weekday } => format!(
                "{} {} of each month",
                week_num.label(),
                weekday_name(*weekday)
            ),
            Self::Interval { every_days: 1 } => "Every day".to_string(),
            Self::Interval { every_days } => format!("Every {every_days} days"),
            Self::Cycle { on_days, off_days } => format!("{on_days} on / {off_days} off"),
        }
    }
}

/// Whether `config` fires on `target`.
///
/// `Daily` (and any degenerate shape) ignores the anchor entirely. Every other
/// rule is "not yet started" before a present anchor. Relative rules without an
/// anchor count from `target` itself.
pub fn is_due_on(config: &SchedulingConfig, anchor: Option<NaiveDate>, target: NaiveDate) -> bool {
    if config.is_degenerate() {
        return true;
    }
    if anchor.is_some_and(|anchor| target < anchor) {
        return false;
    }

    match config {
        SchedulingConfig::Daily => true,
        SchedulingConfig::Weekly { days } => days.contains(&target.weekday()),
        SchedulingConfig::Monthly { day_of_month } => target.day() == *day_of_month,
        SchedulingConfig::MonthlyRelative { week_num, weekday } => {
            let selected = match week_num {
                WeekOrdinal::Nth(n) => {
                    nth_weekday_of_month(target.year(), target.month(), *weekday, *n)
                }
                WeekOrdinal::Last => last_weekday_of_month(target.year(), target.month(), *weekday),
            };
            selected == Some(target)
        }
        SchedulingConfig::Interval { every_days } => {
            let elapsed = days_between(anchor.unwrap_or(target), target);
            elapsed >= 0 && euclid_mod(elapsed, i64::from(*every_days)) == Some(0)
        }
        SchedulingConfig::Cycle { on_days, off_days } => {
            cycle_phase(*on_days, *off_days, anchor, target).is_some_and(|phase| phase.is_on())
        }
    }
}

/// First date in `from..=from + horizon_days` on which `config` fires.
pub fn next_due_on(
    config: &SchedulingConfig,
    anchor: Option<NaiveDate>,
    from: NaiveDate,
    horizon_days: u32,
) -> Option<NaiveDate> {
    (0..=i64::from(horizon_days))
        .filter_map(|offset| from.checked_add_signed(Duration::days(offset)))
        .find(|candidate| is_due_on(config, anchor, *candidate))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CyclePhase {
    On { day: u32, of: u32 },
    Rest { day: u32, of: u32 },
}

impl CyclePhase {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On { .. })
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On { day, of } => write!(f, "On, day {day}/{of}"),
            Self::Rest { day, of } => write!(f, "Rest, {day}/{of}"),
        }
    }
}

/// Position of `target` inside an on/off loop. `None` before the anchor or for
/// an empty "on" window.
pub fn cycle_phase(
    on_days: u32,
    off_days: u32,
    anchor: Option<NaiveDate>,
    target: NaiveDate,
) -> Option<CyclePhase> {
    if on_days == 0 {
        return None;
    }
    let elapsed = days_between(anchor.unwrap_or(target), target);
    if elapsed < 0 {
        return None;
    }
    let cycle_len = i64::from(on_days) + i64::from(off_days);
    let position = euclid_mod(elapsed, cycle_len)? + 1;
    let position = u32::try_from(position).ok()?;
    if position <= on_days {
        Some(CyclePhase::On {
            day: position,
            of: on_days,
        })
    } else {
        Some(CyclePhase::Rest {
            day: position - on_days,
            of: off_days,
        })
    }
}

/// Result of reading a persisted `scheduling_config` blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParse {
    pub config: SchedulingConfig,
    pub start_date: Option<NaiveDate>,
    pub issue: Option<String>,
}

impl ScheduleParse {
    /// Never fails: anything unreadable becomes `Daily` with the reason kept in `issue`.
    /// Reporting the issue is left to the caller, which knows the owning entity.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::clean(SchedulingConfig::Daily, None);
        };
        match value {
            Value::Null => Self::clean(SchedulingConfig::Daily, None),
            Value::Array(days) => match read_days(days) {
                Ok(days) => Self::clean(SchedulingConfig::Weekly { days }, None),
                Err(reason) => Self::coerced(reason),
            },
            Value::Object(object) => {
                let start_date = read_start_date(object);
                match read_tagged(object) {
                    Ok(config) => Self::clean(config, start_date),
                    Err(reason) => Self::coerced(reason),
                }
            }
            other => Self::coerced(format!("unsupported schedule shape: {other}")),
        }
    }

    fn clean(config: SchedulingConfig, start_date: Option<NaiveDate>) -> Self {
        Self {
            config,
            start_date,
            issue: None,
        }
    }

    fn coerced(reason: String) -> Self {
        Self {
            config: SchedulingConfig::Daily,
            start_date: None,
            issue: Some(reason),
        }
    }
}

fn read_tagged(object: &serde_json::Map<String, Value>) -> Result<SchedulingConfig, String> {
    let Some(tag) = object.get("type").and_then(Value::as_str) else {
        // Legacy "simple frequency" shape: a bare day set without a tag.
        if let Some(days) = object.get("days").and_then(Value::as_array) {
            return Ok(SchedulingConfig::Weekly {
                days: read_days(days)?,
            });
        }
        return Err("schedule.type is missing".to_string());
    };

    match tag.trim() {
        "daily" => Ok(SchedulingConfig::Daily),
        "weekly" => {
            let days = match object.get("days") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(days)) => read_days(days)?,
                Some(other) => return Err(format!("schedule.days must be a list, got {other}")),
            };
            Ok(SchedulingConfig::Weekly { days })
        }
        "monthly" => {
            let day = read_int(object, "dayOfMonth")?;
            if !(1..=31).contains(&day) {
                return Err(format!("schedule.dayOfMonth out of range: {day}"));
            }
            Ok(SchedulingConfig::Monthly {
                day_of_month: day as u32,
            })
        }
        "monthly_relative" => {
            let week_num = read_int(object, "weekNum")?;
            let week_num = i8::try_from(week_num)
                .map_err(|_| format!("schedule.weekNum out of range: {week_num}"))
                .and_then(WeekOrdinal::try_from)?;
            let weekday = object
                .get("weekday")
                .and_then(read_weekday)
                .ok_or_else(|| "schedule.weekday is missing or invalid".to_string())?;
            Ok(SchedulingConfig::MonthlyRelative { week_num, weekday })
        }
        "interval" => {
            let every_days = read_int(object, "everyDays")?;
            if every_days < 1 {
                return Err(format!("schedule.everyDays must be >= 1, got {every_days}"));
            }
            let every_days = u32::try_from(every_days)
                .map_err(|_| format!("schedule.everyDays too large: {every_days}"))?;
            Ok(SchedulingConfig::Interval { every_days })
        }
        "cycle" => {
            let on_days = read_int(object, "onDays")?;
            let off_days = match object.get("offDays") {
                None | Some(Value::Null) => 0,
                Some(_) => read_int(object, "offDays")?,
            };
            if on_days < 1 {
                return Err(format!("schedule.onDays must be >= 1, got {on_days}"));
            }
            if off_days < 0 {
                return Err(format!("schedule.offDays must be >= 0, got {off_days}"));
            }
            let on_days = u32::try_from(on_days)
                .map_err(|_| format!("schedule.onDays too large: {on_days}"))?;
            let off_days = u32::try_from(off_days)
                .map_err(|_| format!("schedule.offDays too large: {off_days}"))?;
            Ok(SchedulingConfig::Cycle { on_days, off_days })
        }
        other => Err(format!("unknown schedule type '{other}'")),
    }
}

fn read_int(object: &serde_json::Map<String, Value>, key: &str) -> Result<i64, String> {
    let value = object
        .get(key)
        .ok_or_else(|| format!("schedule.{key} is missing"))?;
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                    .map(|float| float as i64)
            })
            .ok_or_else(|| format!("schedule.{key} must be an integer, got {number}")),
        Value::String(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("schedule.{key} must be an integer, got '{raw}'")),
        other => Err(format!("schedule.{key} must be an integer, got {other}")),
    }
}

fn read_weekday(value: &Value) -> Option<Weekday> {
    match value {
        Value::Number(number) => number.as_i64().and_then(weekday_from_index),
        Value::String(raw) => weekday_from_name(raw)
            .or_else(|| raw.trim().parse::<i64>().ok().and_then(weekday_from_index)),
        _ => None,
    }
}

fn read_days(values: &[Value]) -> Result<Vec<Weekday>, String> {
    let mut days = Vec::with_capacity(values.len());
    for value in values {
        let day = read_weekday(value).ok_or_else(|| format!("invalid weekday in schedule.days: {value}"))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

fn read_start_date(object: &serde_json::Map<String, Value>) -> Option<NaiveDate> {
    let raw = object.get("startDate").and_then(Value::as_str)?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        tracing::warn!(start_date = raw, "ignoring unreadable schedule.startDate");
    }
    parsed
}
