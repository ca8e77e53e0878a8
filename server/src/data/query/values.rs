//! Value preparation
//!
//! Turns a validated rule's raw values into typed bind values and decides how
//! the field expression is wrapped before the operator template is applied.

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use crate::utils::sql::escape_like_pattern;

use super::error::QueryError;
use super::types::{ActingIdentity, FilterType, ParamValue, RuleValue, ValidatedRule};

/// Contact value that resolves to the acting identity
pub const ME: &str = "me";

/// Truncation unit for date comparisons, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DateUnit {
    /// Name understood by PostgreSQL's `DATE_TRUNC`
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }

    fn from_modifier(c: &str) -> Option<Self> {
        match c {
            "y" => Some(Self::Year),
            "M" => Some(Self::Month),
            "d" => Some(Self::Day),
            "h" => Some(Self::Hour),
            "m" => Some(Self::Minute),
            "s" => Some(Self::Second),
            _ => None,
        }
    }

    /// Truncate a timestamp to this unit (UTC)
    pub fn truncate(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let (month, day) = match self {
            Self::Year => (1, 1),
            _ => (t.month(), if *self == Self::Month { 1 } else { t.day() }),
        };
        let hour = if *self >= Self::Hour { t.hour() } else { 0 };
        let minute = if *self >= Self::Minute { t.minute() } else { 0 };
        let second = if *self >= Self::Second { t.second() } else { 0 };
        Utc.with_ymd_and_hms(t.year(), month, day, hour, minute, second)
            .single()
            .unwrap_or(t)
    }
}

/// How the field expression is wrapped before the operator template applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    Identity,
    /// NULL text compares as the empty string
    Coalesce,
    DateTrunc(DateUnit),
}

impl FieldTransform {
    pub fn apply(&self, field: &str) -> String {
        match self {
            Self::Identity => field.to_string(),
            Self::Coalesce => format!("COALESCE({},'')", field),
            Self::DateTrunc(unit) => format!("DATE_TRUNC('{}', {})", unit.as_sql(), field),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRule {
    pub transform: FieldTransform,
    pub values: Vec<ParamValue>,
}

/// Parse a date rule value into a timestamp and its precision
///
/// Accepts absolute dates (`2024`, `2024-05`, `2024-05-17`, `2024-05-17T10:30`,
/// RFC 3339) and relative dates (`$now`, `$now(d:-1,h:2)`).
pub fn parse_date(value: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateUnit)> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix("$now") {
        return parse_relative(rest, now);
    }

    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        let year = value.parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
        return Some((date.and_hms_opt(0, 0, 0)?.and_utc(), DateUnit::Year));
    }
    if value.len() == 7 {
        let date = NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok()?;
        return Some((date.and_hms_opt(0, 0, 0)?.and_utc(), DateUnit::Month));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some((date.and_hms_opt(0, 0, 0)?.and_utc(), DateUnit::Day));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some((t.and_utc(), DateUnit::Minute));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some((t.with_timezone(&Utc), DateUnit::Second));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some((t.and_utc(), DateUnit::Second));
    }
    None
}

fn parse_relative(rest: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateUnit)> {
    if rest.is_empty() {
        return Some((now, DateUnit::Second));
    }

    let body = rest.strip_prefix('(')?.strip_suffix(')')?;
    let mut date = now;
    let mut precision: Option<DateUnit> = None;

    for modifier in body.split(',').filter(|m| !m.is_empty()) {
        let (unit, amount) = modifier.split_once(':')?;
        let unit = DateUnit::from_modifier(unit.trim())?;
        let amount: i64 = amount.trim().parse().ok()?;
        date = shift(date, unit, amount)?;
        precision = Some(precision.map_or(unit, |p| p.max(unit)));
    }

    Some((date, precision?))
}

fn shift(date: DateTime<Utc>, unit: DateUnit, amount: i64) -> Option<DateTime<Utc>> {
    let add_months = |months: i64| {
        let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
        if months >= 0 {
            date.checked_add_months(magnitude)
        } else {
            date.checked_sub_months(magnitude)
        }
    };
    match unit {
        DateUnit::Year => add_months(amount.checked_mul(12)?),
        DateUnit::Month => add_months(amount),
        DateUnit::Day => date.checked_add_signed(Duration::try_days(amount)?),
        DateUnit::Hour => date.checked_add_signed(Duration::try_hours(amount)?),
        DateUnit::Minute => date.checked_add_signed(Duration::try_minutes(amount)?),
        DateUnit::Second => date.checked_add_signed(Duration::try_seconds(amount)?),
    }
}

/// Pick the truncation unit for a set of parsed dates
///
/// The finest precision any value needs, but never coarser than a day.
pub fn comparison_unit(units: impl IntoIterator<Item = DateUnit>) -> DateUnit {
    units
        .into_iter()
        .fold(DateUnit::Day, |acc, unit| acc.max(unit))
}

/// Prepare a validated rule's values and field transform
pub fn prepare_rule(
    rule: &ValidatedRule,
    identity: Option<&ActingIdentity>,
    now: DateTime<Utc>,
) -> Result<PreparedRule, QueryError> {
    match rule.filter_type {
        FilterType::Text | FilterType::Blob => {
            let transform = if rule.nullable {
                FieldTransform::Coalesce
            } else {
                FieldTransform::Identity
            };
            let values = rule
                .values
                .iter()
                .map(|v| {
                    let text = expect_text(rule, v)?;
                    Ok(ParamValue::Text(if rule.operator.is_pattern() {
                        escape_like_pattern(text)
                    } else {
                        text.to_string()
                    }))
                })
                .collect::<Result<_, QueryError>>()?;
            Ok(PreparedRule { transform, values })
        }
        FilterType::Date => {
            let parsed = rule
                .values
                .iter()
                .map(|v| {
                    let text = expect_text(rule, v)?;
                    parse_date(text, now).ok_or_else(|| {
                        QueryError::invalid_rule(rule, format!("Invalid date value: {}", text))
                    })
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            let unit = comparison_unit(parsed.iter().map(|(_, u)| *u));
            let values = parsed
                .into_iter()
                .map(|(t, _)| ParamValue::Timestamp(unit.truncate(t)))
                .collect();
            Ok(PreparedRule {
                transform: FieldTransform::DateTrunc(unit),
                values,
            })
        }
        FilterType::Number => {
            let values = rule
                .values
                .iter()
                .map(|v| match v {
                    RuleValue::Number(n) => Ok(ParamValue::Number(*n)),
                    RuleValue::Text(s) => s.trim().parse().map(ParamValue::Number).map_err(|_| {
                        QueryError::invalid_rule(rule, format!("Invalid number value: {}", s))
                    }),
                    RuleValue::Bool(_) => Err(QueryError::invalid_rule(
                        rule,
                        "Expected a number value",
                    )),
                })
                .collect::<Result<_, QueryError>>()?;
            Ok(identity_transform(values))
        }
        FilterType::Boolean => {
            let values = rule
                .values
                .iter()
                .map(|v| match v {
                    RuleValue::Bool(b) => Ok(ParamValue::Bool(*b)),
                    _ => Err(QueryError::invalid_rule(rule, "Expected a boolean value")),
                })
                .collect::<Result<_, QueryError>>()?;
            Ok(identity_transform(values))
        }
        FilterType::Contact => {
            let values = rule
                .values
                .iter()
                .map(|v| {
                    let text = expect_text(rule, v)?;
                    if text != ME {
                        return Ok(ParamValue::Text(text.to_string()));
                    }
                    identity
                        .map(|i| ParamValue::Text(i.id.clone()))
                        .ok_or_else(|| {
                            QueryError::usage(
                                "ME_WITHOUT_IDENTITY",
                                format!(
                                    "Field '{}' uses \"me\" but the request has no acting identity",
                                    rule.field
                                ),
                            )
                        })
                })
                .collect::<Result<_, QueryError>>()?;
            Ok(identity_transform(values))
        }
        FilterType::Array | FilterType::Enum => {
            let values = rule
                .values
                .iter()
                .map(|v| expect_text(rule, v).map(|s| ParamValue::Text(s.to_string())))
                .collect::<Result<_, QueryError>>()?;
            Ok(identity_transform(values))
        }
    }
}

fn identity_transform(values: Vec<ParamValue>) -> PreparedRule {
    PreparedRule {
        transform: FieldTransform::Identity,
        values,
    }
}

fn expect_text<'a>(rule: &ValidatedRule, value: &'a RuleValue) -> Result<&'a str, QueryError> {
    match value {
        RuleValue::Text(s) => Ok(s),
        other => Err(QueryError::invalid_rule(
            rule,
            format!("Expected a string value, got {}", other),
        )),
    }
}
