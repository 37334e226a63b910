//! Typed values and the field-aware value parser.
//!
//! Raw strings arriving from query parameters or payloads are converted with
//! [`parse_value()`]: count fields become integers, `date` becomes a
//! [`NaiveDate`], everything else passes through as text. Dates travel as
//! `YYYY-MM-DD` in both directions ([`parse_date()`] / [`format_date()`]).

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const COUNT_FIELDS: &[&str] = &["confirmed", "deaths", "recovered"];
pub const DATE_FIELD: &str = "date";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Integer(i64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Date(d) => format_date(*d),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Converts `raw` into the value type that `field` stores.
pub fn parse_value(field: &str, raw: &str) -> Result<Value> {
    if COUNT_FIELDS.contains(&field) {
        parse_count(raw).map(Value::Integer)
    } else if field == DATE_FIELD {
        parse_date(raw).map(Value::Date)
    } else {
        Ok(Value::Text(raw.to_string()))
    }
}

pub fn parse_count(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::Parse(format!("Failed to parse '{raw}' as integer")))
}

/// Parses `YYYY-MM-DD`. Components need not be zero padded.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let invalid = || Error::Parse(format!("Failed to parse '{raw}' as date (expected YYYY-MM-DD)"));
    let parts = raw.trim().split('-').collect::<Vec<_>>();
    let [year, month, day] = parts.as_slice() else {
        return Err(invalid());
    };
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Dates as they appear in the time-series headers (`4/3/20`, `4/3/2020`).
pub fn parse_series_date(raw: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];
    let trimmed = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    Err(Error::Parse(format!("Failed to parse '{raw}' as series date")))
}

/// Lower-cases a country or province name and replaces spaces with underscores.
pub fn normalize_location(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Serde adapter rendering `NaiveDate` as `YYYY-MM-DD`.
pub mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(de::Error::custom)
    }
}
