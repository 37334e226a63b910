//! Time-series ingestion: reshape the wide CSSE files into long rows, inner
//! join the three case types and append the result to the table in batches.

use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, error, info};

use crate::{
    data::{normalize_location, parse_count, parse_series_date},
    error::{Error, Result},
    io_utils,
    store::{DayKey, NewDay, Table},
};

/// Columns preceding the first date column: `Province/State, Country/Region, Lat, Long`.
pub const LEADING_COLUMNS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const CONFIRMED_FILE: &str = "time_series_covid19_confirmed_global.csv";
const DEATHS_FILE: &str = "time_series_covid19_deaths_global.csv";
const RECOVERED_FILE: &str = "time_series_covid19_recovered_global.csv";

/// One observation of a single case type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRow {
    pub date: NaiveDate,
    pub country_name: String,
    pub province: String,
    pub count: i64,
}

impl CaseRow {
    fn key(&self) -> DayKey {
        DayKey {
            country_name: self.country_name.clone(),
            province: self.province.clone(),
            date: self.date,
        }
    }
}

/// A wide time-series file viewed as long rows labelled with a case type.
///
/// Each call to [`CaseSeries::rows()`] re-opens the file, so a series can be
/// walked any number of times.
#[derive(Debug, Clone)]
pub struct CaseSeries {
    path: PathBuf,
    label: String,
    encoding: &'static Encoding,
}

pub fn reshape(path: impl Into<PathBuf>, label: &str) -> CaseSeries {
    CaseSeries {
        path: path.into(),
        label: label.to_string(),
        encoding: UTF_8,
    }
}

impl CaseSeries {
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the count column, e.g. `confirmed`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rows(&self) -> Result<CaseRows> {
        let mut reader = io_utils::open_csv_reader_from_path(&self.path)?;
        let headers = io_utils::reader_headers(&mut reader, self.encoding)?;
        if headers.len() < LEADING_COLUMNS {
            return Err(Error::Parse(format!(
                "{:?} has {} column(s); expected Province/State, Country/Region, Lat, Long \
                 before the dates",
                self.path,
                headers.len()
            )));
        }
        let dates = headers[LEADING_COLUMNS..]
            .iter()
            .map(|header| parse_series_date(header))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Reshaping {:?} as '{}' across {} date column(s)",
            self.path,
            self.label,
            dates.len()
        );
        Ok(CaseRows {
            reader,
            encoding: self.encoding,
            path: self.path.clone(),
            dates,
            record: csv::ByteRecord::new(),
            line: 1,
            current: None,
            finished: false,
        })
    }
}

struct Location {
    country_name: String,
    province: String,
    counts: Vec<i64>,
    next: usize,
}

/// Row-major iterator over one pass of a [`CaseSeries`].
pub struct CaseRows {
    reader: csv::Reader<Box<dyn Read>>,
    encoding: &'static Encoding,
    path: PathBuf,
    dates: Vec<NaiveDate>,
    record: csv::ByteRecord,
    line: usize,
    current: Option<Location>,
    finished: bool,
}

impl CaseRows {
    fn read_location(&mut self) -> Result<Option<Location>> {
        let has_record = self
            .reader
            .read_byte_record(&mut self.record)
            .map_err(|err| io_utils::csv_error(&format!("Reading {:?}", self.path), err))?;
        if !has_record {
            return Ok(None);
        }
        self.line += 1;
        let decoded = io_utils::decode_record(&self.record, self.encoding)?;
        let counts = decoded[LEADING_COLUMNS..]
            .iter()
            .map(|cell| parse_count(cell))
            .collect::<Result<Vec<_>>>()
            .map_err(|err| Error::Parse(format!("{:?} line {}: {err}", self.path, self.line)))?;
        Ok(Some(Location {
            province: normalize_location(&decoded[0]),
            country_name: normalize_location(&decoded[1]),
            counts,
            next: 0,
        }))
    }
}

impl Iterator for CaseRows {
    type Item = Result<CaseRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(location) = self.current.as_mut() {
                if location.next < location.counts.len() {
                    let idx = location.next;
                    location.next += 1;
                    return Some(Ok(CaseRow {
                        date: self.dates[idx],
                        country_name: location.country_name.clone(),
                        province: location.province.clone(),
                        count: location.counts[idx],
                    }));
                }
                self.current = None;
            }
            match self.read_location() {
                Ok(Some(location)) => self.current = Some(location),
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Inner joins the three case types on `(date, country_name, province)`.
///
/// Keys missing from any input are dropped. Output follows the order of
/// `confirmed`; duplicate keys yield every combination of matches.
pub fn merge<C, D, R>(confirmed: C, deaths: D, recovered: R) -> Result<Vec<NewDay>>
where
    C: IntoIterator<Item = Result<CaseRow>>,
    D: IntoIterator<Item = Result<CaseRow>>,
    R: IntoIterator<Item = Result<CaseRow>>,
{
    let deaths = build_lookup(deaths)?;
    let recovered = build_lookup(recovered)?;
    let mut merged = Vec::new();
    let mut dropped = 0usize;
    for row in confirmed {
        let row = row?;
        let key = row.key();
        let (Some(death_counts), Some(recovered_counts)) = (deaths.get(&key), recovered.get(&key))
        else {
            dropped += 1;
            continue;
        };
        for (death_count, recovered_count) in
            death_counts.iter().cartesian_product(recovered_counts)
        {
            merged.push(NewDay {
                country_name: row.country_name.clone(),
                province: row.province.clone(),
                date: row.date,
                confirmed: row.count,
                deaths: *death_count,
                recovered: *recovered_count,
            });
        }
    }
    debug!(
        "Merged {} day(s); dropped {} confirmed row(s) without deaths and recovered counterparts",
        merged.len(),
        dropped
    );
    Ok(merged)
}

fn build_lookup<I>(rows: I) -> Result<HashMap<DayKey, Vec<i64>>>
where
    I: IntoIterator<Item = Result<CaseRow>>,
{
    let mut lookup: HashMap<DayKey, Vec<i64>> = HashMap::new();
    for row in rows {
        let row = row?;
        lookup.entry(row.key()).or_default().push(row.count);
    }
    Ok(lookup)
}

/// Counts from an append that stopped early or finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub appended: usize,
    pub batches: usize,
}

/// Appends `days` in batches of `batch_size`; the first failing batch aborts the rest.
pub fn append_in_batches<I>(table: &mut Table, days: I, batch_size: usize) -> Result<AppendSummary>
where
    I: IntoIterator<Item = NewDay>,
{
    let batch_size = batch_size.max(1);
    let mut summary = AppendSummary::default();
    let chunks = days.into_iter().chunks(batch_size);
    for chunk in &chunks {
        match table.append_batch(chunk.collect()) {
            Ok(appended) => {
                summary.appended += appended;
                summary.batches += 1;
            }
            Err(err) => {
                error!(
                    "Batch {} failed after {} day(s) in {} batch(es): {err}",
                    summary.batches + 1,
                    summary.appended,
                    summary.batches
                );
                return Err(err);
            }
        }
    }
    Ok(summary)
}

/// What an import does when the table already holds days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum IfExists {
    /// Append to existing days; a day that already exists aborts the import
    Append,
    /// Remove every existing day first
    Replace,
    /// Refuse to import into a non-empty table
    Fail,
}

/// Locations of the three global time-series files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPaths {
    pub confirmed: PathBuf,
    pub deaths: PathBuf,
    pub recovered: PathBuf,
}

impl SeriesPaths {
    pub fn in_dir(dir: &Path) -> Self {
        SeriesPaths {
            confirmed: dir.join(CONFIRMED_FILE),
            deaths: dir.join(DEATHS_FILE),
            recovered: dir.join(RECOVERED_FILE),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub if_exists: IfExists,
    pub batch_size: usize,
    pub encoding: &'static Encoding,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            if_exists: IfExists::Append,
            batch_size: DEFAULT_BATCH_SIZE,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub merged: usize,
    pub appended: usize,
    pub batches: usize,
}

/// Reshapes, merges and appends the three series into `table`.
pub fn import_series(
    table: &mut Table,
    paths: &SeriesPaths,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    info!("Importing time series csv into table...");
    if options.if_exists == IfExists::Fail && !table.is_empty() {
        return Err(Error::DataValidation(format!(
            "Table already holds {} day(s); refusing to import",
            table.len()
        )));
    }

    let confirmed = reshape(&paths.confirmed, "confirmed").with_encoding(options.encoding);
    let deaths = reshape(&paths.deaths, "deaths").with_encoding(options.encoding);
    let recovered = reshape(&paths.recovered, "recovered").with_encoding(options.encoding);
    let merged = merge(confirmed.rows()?, deaths.rows()?, recovered.rows()?)?;
    let merged_count = merged.len();

    // the table is only cleared once every input has been read
    if options.if_exists == IfExists::Replace {
        table.clear();
    }

    let appended = append_in_batches(table, merged, options.batch_size)?;
    info!(
        "Import complete: {} day(s) appended in {} batch(es)",
        appended.appended, appended.batches
    );
    Ok(ImportSummary {
        merged: merged_count,
        appended: appended.appended,
        batches: appended.batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: (i32, u32, u32), country: &str, province: &str, count: i64) -> CaseRow {
        CaseRow {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            country_name: country.to_string(),
            province: province.to_string(),
            count,
        }
    }

    fn ok(rows: Vec<CaseRow>) -> impl Iterator<Item = Result<CaseRow>> {
        rows.into_iter().map(Ok)
    }

    #[test]
    fn merge_drops_keys_missing_from_any_input() {
        let confirmed = vec![
            row((2020, 4, 3), "singapore", "", 10),
            row((2020, 4, 4), "singapore", "", 20),
        ];
        let deaths = vec![
            row((2020, 4, 3), "singapore", "", 1),
            row((2020, 4, 4), "singapore", "", 2),
        ];
        let recovered = vec![row((2020, 4, 3), "singapore", "", 5)];

        let merged = merge(ok(confirmed), ok(deaths), ok(recovered)).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confirmed, 10);
        assert_eq!(merged[0].deaths, 1);
        assert_eq!(merged[0].recovered, 5);
    }

    #[test]
    fn merge_follows_confirmed_order() {
        let confirmed = vec![
            row((2020, 4, 4), "b", "", 2),
            row((2020, 4, 3), "a", "x", 1),
        ];
        let others = || {
            vec![
                row((2020, 4, 3), "a", "x", 0),
                row((2020, 4, 4), "b", "", 0),
            ]
        };
        let merged = merge(ok(confirmed), ok(others()), ok(others())).unwrap();
        let countries = merged
            .iter()
            .map(|day| day.country_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(countries, vec!["b", "a"]);
    }

    #[test]
    fn merge_province_is_part_of_the_key() {
        let confirmed = vec![row((2020, 4, 3), "united_kingdom", "bermuda", 1)];
        let deaths = vec![row((2020, 4, 3), "united_kingdom", "cayman_islands", 1)];
        let recovered = vec![row((2020, 4, 3), "united_kingdom", "bermuda", 1)];
        assert!(merge(ok(confirmed), ok(deaths), ok(recovered)).unwrap().is_empty());
    }

    #[test]
    fn merge_surfaces_row_errors() {
        let confirmed = vec![Err(Error::Parse("bad".to_string()))];
        let err = merge(confirmed, ok(vec![]), ok(vec![])).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn append_in_batches_aborts_on_failing_batch() {
        let mut table = Table::new();
        let day = |country: &str| NewDay {
            country_name: country.to_string(),
            province: String::new(),
            date: NaiveDate::from_ymd_opt(2020, 4, 3).unwrap(),
            confirmed: 1,
            deaths: 0,
            recovered: 0,
        };
        let days = vec![day("a"), day("b"), day("c"), day("a"), day("d"), day("e")];
        let err = append_in_batches(&mut table, days, 2).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        // first batch [a, b] is stored; [c, a] and everything after is not
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn append_in_batches_counts_partial_last_batch() {
        let mut table = Table::new();
        let days = (1..=5u32)
            .map(|day| NewDay {
                country_name: "chad".to_string(),
                province: String::new(),
                date: NaiveDate::from_ymd_opt(2020, 4, day).unwrap(),
                confirmed: 1,
                deaths: 0,
                recovered: 0,
            })
            .collect::<Vec<_>>();
        let summary = append_in_batches(&mut table, days, 2).unwrap();
        assert_eq!(
            summary,
            AppendSummary {
                appended: 5,
                batches: 3
            }
        );
    }

    #[test]
    fn series_paths_use_global_file_names() {
        let paths = SeriesPaths::in_dir(Path::new("data"));
        assert_eq!(
            paths.recovered,
            Path::new("data").join("time_series_covid19_recovered_global.csv")
        );
    }

    #[test]
    fn if_exists_parses_kebab_case_policies() {
        assert_eq!(IfExists::from_str("replace", false).unwrap(), IfExists::Replace);
        assert_eq!(IfExists::from_str("fail", false).unwrap(), IfExists::Fail);
        assert!(IfExists::from_str("merge", false).is_err());
        assert_eq!(ImportOptions::default().if_exists, IfExists::Append);
    }
}
