//! Attribute filters over stored days.
//!
//! A filter arrives as a `(field, "operator,value")` pair, typically one
//! query-string entry such as `confirmed=ge,100`. [`build()`] turns an ordered
//! list of such pairs into [`Filter`]s and [`apply()`] folds them onto a
//! [`Query`] as a conjunction.

use std::{fmt, str::FromStr};

use log::debug;

use crate::{
    data::{Value, parse_value},
    error::{Error, Result},
    store::{DailyRecord, Query},
};

pub const SUPPORTED_OPERATORS: &[&str] = &["eq", "ne", "lt", "le", "gt", "ge"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Ne => "ne",
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Le => "le",
            ComparisonOperator::Gt => "gt",
            ComparisonOperator::Ge => "ge",
        }
    }

    pub fn compare<T: Ord + ?Sized>(self, left: &T, right: &T) -> bool {
        use ComparisonOperator::*;
        match self {
            Eq => left == right,
            Ne => left != right,
            Lt => left < right,
            Le => left <= right,
            Gt => left > right,
            Ge => left >= right,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim() {
            "eq" => Ok(ComparisonOperator::Eq),
            "ne" => Ok(ComparisonOperator::Ne),
            "lt" => Ok(ComparisonOperator::Lt),
            "le" => Ok(ComparisonOperator::Le),
            "gt" => Ok(ComparisonOperator::Gt),
            "ge" => Ok(ComparisonOperator::Ge),
            other => Err(Error::QueryValidation(format!(
                "operator `{other}` is not one of supported operators `{}`",
                SUPPORTED_OPERATORS.join(", ")
            ))),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes of a day that can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    CountryName,
    Province,
    Date,
    Confirmed,
    Deaths,
    Recovered,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::CountryName,
        Field::Province,
        Field::Date,
        Field::Confirmed,
        Field::Deaths,
        Field::Recovered,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::CountryName => "country_name",
            Field::Province => "province",
            Field::Date => "date",
            Field::Confirmed => "confirmed",
            Field::Deaths => "deaths",
            Field::Recovered => "recovered",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Field::CountryName | Field::Province => matches!(value, Value::Text(_)),
            Field::Date => matches!(value, Value::Date(_)),
            Field::Confirmed | Field::Deaths | Field::Recovered => {
                matches!(value, Value::Integer(_))
            }
        }
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == name.trim())
            .ok_or_else(|| {
                let names = Field::ALL.map(Field::name);
                Error::QueryValidation(format!(
                    "field `{name}` is not one of supported fields `{}`",
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    field: Field,
    operator: ComparisonOperator,
    value: Value,
}

impl Filter {
    pub fn new(field: Field, operator: ComparisonOperator, value: Value) -> Result<Self> {
        if !field.accepts(&value) {
            return Err(Error::QueryValidation(format!(
                "value `{value}` has the wrong type for field `{field}`"
            )));
        }
        Ok(Filter {
            field,
            operator,
            value,
        })
    }

    /// Parses one `(field, "operator,value")` pair.
    pub fn parse(field: &str, operator_and_value: &str) -> Result<Self> {
        let parts = operator_and_value.split(',').collect::<Vec<_>>();
        let [operator, raw_value] = parts.as_slice() else {
            return Err(Error::QueryValidation(format!(
                "Invalid filter query `{field}={operator_and_value}`, \
                 expected `{field}=operator,value`"
            )));
        };
        let field: Field = field.parse()?;
        let operator: ComparisonOperator = operator.parse()?;
        let value = parse_value(field.name(), raw_value)?;
        Filter::new(field, operator, value)
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn matches(&self, record: &DailyRecord) -> bool {
        let op = self.operator;
        match (self.field, &self.value) {
            (Field::CountryName, Value::Text(v)) => {
                op.compare(record.country_name.as_str(), v.as_str())
            }
            (Field::Province, Value::Text(v)) => op.compare(record.province.as_str(), v.as_str()),
            (Field::Date, Value::Date(v)) => op.compare(&record.date, v),
            (Field::Confirmed, Value::Integer(v)) => op.compare(&record.confirmed, v),
            (Field::Deaths, Value::Integer(v)) => op.compare(&record.deaths, v),
            (Field::Recovered, Value::Integer(v)) => op.compare(&record.recovered, v),
            // `Filter::new` rejects mismatched value types
            _ => false,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={},{}", self.field, self.operator, self.value)
    }
}

/// Builds filters from raw `(field, "operator,value")` pairs, preserving order.
pub fn build<K, V>(pairs: &[(K, V)]) -> Result<Vec<Filter>>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .iter()
        .map(|(field, operator_and_value)| {
            Filter::parse(field.as_ref(), operator_and_value.as_ref())
        })
        .collect()
}

/// ANDs every filter onto `query`.
pub fn apply<'a>(filters: &[Filter], query: Query<'a>) -> Query<'a> {
    filters.iter().fold(query, |query, filter| {
        debug!("Applying filter {filter}");
        query.filter(filter.clone())
    })
}

/// Splits a URL query string into ordered key/value pairs, keeping repeated keys.
pub fn parse_query_string(query: &str) -> Result<Vec<(String, String)>> {
    query
        .trim()
        .trim_start_matches('?')
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|err| {
            Error::QueryValidation(format!("Invalid query string component '{raw}': {err}"))
        })
}
