//! Resource operations over the day table.
//!
//! Each operation takes the table handle explicitly. Payloads are JSON
//! objects carrying every attribute of a day; ids are never taken from the
//! payload.

use log::info;
use serde_json::{Map, Value as Json};

use crate::{
    data::{Value, parse_date},
    error::{Error, Result},
    filter::{self, ComparisonOperator, Field, Filter},
    store::{DailyRecord, NewDay, Table},
};

const REQUIRED_FIELDS: &[&str] = &[
    "country_name",
    "province",
    "date",
    "confirmed",
    "deaths",
    "recovered",
];

/// Days matching every raw `(field, "operator,value")` pair.
pub fn list_days<K, V>(table: &Table, pairs: &[(K, V)]) -> Result<Vec<DailyRecord>>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let filters = filter::build(pairs)?;
    info!("Returning days matching {} filter(s)", filters.len());
    Ok(filter::apply(&filters, table.query()).all())
}

pub fn get_day(table: &Table, id: u64) -> Result<DailyRecord> {
    info!("Request for day with id: {id}");
    table.get(id).cloned()
}

pub fn create_day(table: &mut Table, payload: &Json) -> Result<DailyRecord> {
    let day = deserialize_day(payload)?;
    info!("Creating day in table");
    table.insert(day)
}

pub fn update_day(table: &mut Table, id: u64, payload: &Json) -> Result<DailyRecord> {
    info!("Updating day entry with id: {id}");
    table.get(id)?;
    let day = deserialize_day(payload)?;
    table.update(id, day)
}

pub fn delete_day(table: &mut Table, id: u64) -> Result<DailyRecord> {
    info!("Deleting day entry with id: {id}");
    table.delete(id)
}

/// Days for `country_name` on `date` across every province.
pub fn find_days(table: &Table, country_name: &str, date: &str) -> Result<Vec<DailyRecord>> {
    info!("Request for day with country_name: '{country_name}' and date: '{date}'");
    let filters = [
        Filter::new(
            Field::CountryName,
            ComparisonOperator::Eq,
            Value::Text(country_name.to_string()),
        )?,
        Filter::new(Field::Date, ComparisonOperator::Eq, Value::Date(parse_date(date)?))?,
    ];
    let days = filter::apply(&filters, table.query()).all();
    if days.is_empty() {
        return Err(Error::NotFound(format!(
            "Day with country_name: '{country_name}' and date: '{date}' \
             was not found in the database"
        )));
    }
    Ok(days)
}

/// Reads a day from a JSON object, naming the first missing attribute.
pub fn deserialize_day(payload: &Json) -> Result<NewDay> {
    let object = payload.as_object().ok_or_else(|| {
        Error::DataValidation("TypeError: Body of request contained bad data".to_string())
    })?;
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|name| !object.contains_key(**name)) {
        return Err(Error::DataValidation(format!(
            "KeyError: Missing field '{missing}'"
        )));
    }
    let date_raw = text_field(object, "date")?;
    let date = parse_date(&date_raw)
        .map_err(|err| Error::DataValidation(format!("TypeError: {err}")))?;
    Ok(NewDay {
        country_name: text_field(object, "country_name")?,
        province: optional_text_field(object, "province")?,
        date,
        confirmed: count_field(object, "confirmed")?,
        deaths: count_field(object, "deaths")?,
        recovered: count_field(object, "recovered")?,
    })
}

fn text_field(object: &Map<String, Json>, name: &str) -> Result<String> {
    object
        .get(name)
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| bad_type(name, "a string"))
}

fn optional_text_field(object: &Map<String, Json>, name: &str) -> Result<String> {
    match object.get(name) {
        None | Some(Json::Null) => Ok(String::new()),
        Some(Json::String(value)) => Ok(value.clone()),
        Some(_) => Err(bad_type(name, "a string or null")),
    }
}

fn count_field(object: &Map<String, Json>, name: &str) -> Result<i64> {
    object
        .get(name)
        .and_then(Json::as_i64)
        .filter(|count| *count >= 0)
        .ok_or_else(|| bad_type(name, "a non-negative integer"))
}

fn bad_type(name: &str, expected: &str) -> Error {
    Error::DataValidation(format!("TypeError: field '{name}' must be {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(country: &str, date: &str) -> Json {
        json!({
            "country_name": country,
            "province": "test province",
            "date": date,
            "confirmed": 1,
            "deaths": 2,
            "recovered": 3
        })
    }

    #[test]
    fn create_rejects_duplicate_location_and_date() {
        let mut table = Table::new();
        let created = create_day(&mut table, &payload("unique country", "2020-04-04")).unwrap();
        assert_eq!(created.id, 1);
        let err = create_day(&mut table, &payload("unique country", "2020-04-04")).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(err.to_string(), "Duplicate date for given country and date");
    }

    #[test]
    fn empty_payload_names_first_missing_field() {
        let err = deserialize_day(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: Missing field 'country_name'");
        let mut partial = payload("x", "2020-04-04");
        partial.as_object_mut().unwrap().remove("deaths");
        let err = deserialize_day(&partial).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: Missing field 'deaths'");
    }

    #[test]
    fn wrong_types_are_data_validation_errors() {
        let mut bad = payload("x", "2020-04-04");
        bad["confirmed"] = json!("ten");
        assert!(matches!(deserialize_day(&bad), Err(Error::DataValidation(_))));
        bad["confirmed"] = json!(-1);
        assert!(matches!(deserialize_day(&bad), Err(Error::DataValidation(_))));
        assert!(matches!(
            deserialize_day(&payload("x", "04/04/2020")),
            Err(Error::DataValidation(_))
        ));
        assert!(matches!(
            deserialize_day(&json!(["not", "an", "object"])),
            Err(Error::DataValidation(_))
        ));
    }

    #[test]
    fn null_province_is_stored_empty() {
        let mut day = payload("singapore", "2020-04-04");
        day["province"] = Json::Null;
        assert_eq!(deserialize_day(&day).unwrap().province, "");
    }

    #[test]
    fn transposed_bounds_return_empty_not_error() {
        let mut table = Table::new();
        for (idx, confirmed) in [500, 1200, 2000].into_iter().enumerate() {
            let mut day = payload("chad", &format!("2020-04-0{}", idx + 1));
            day["confirmed"] = json!(confirmed);
            create_day(&mut table, &day).unwrap();
        }
        let days =
            list_days(&table, &[("confirmed", "gt,1500"), ("confirmed", "lt,1000")]).unwrap();
        assert!(days.is_empty());
        let days = list_days(&table, &[("confirmed", "gt,100"), ("confirmed", "lt,1500")]).unwrap();
        assert_eq!(days.len(), 2);
    }

    #[test]
    fn update_and_delete_by_id() {
        let mut table = Table::new();
        let created = create_day(&mut table, &payload("chad", "2020-04-01")).unwrap();
        let mut changed = payload("chad", "2020-04-01");
        changed["confirmed"] = json!(40);
        let updated = update_day(&mut table, created.id, &changed).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(get_day(&table, created.id).unwrap().confirmed, 40);

        delete_day(&mut table, created.id).unwrap();
        assert!(matches!(get_day(&table, created.id), Err(Error::NotFound(_))));
        assert!(matches!(
            update_day(&mut table, created.id, &changed),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn find_days_matches_country_and_date() {
        let mut table = Table::new();
        create_day(&mut table, &payload("chad", "2020-04-01")).unwrap();
        create_day(&mut table, &payload("chad", "2020-04-02")).unwrap();
        let days = find_days(&table, "chad", "2020-04-02").unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].id, 2);
        assert!(matches!(
            find_days(&table, "chad", "2020-05-01"),
            Err(Error::NotFound(_))
        ));
    }
}
