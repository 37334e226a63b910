//! File-backed table of daily records.
//!
//! [`Table`] owns every [`DailyRecord`], assigns surrogate ids and keeps a
//! unique index over `(country_name, province, date)`. Every write path goes
//! through that index, so a second day for the same location and date is
//! rejected with [`Error::Duplicate`] no matter how it arrives.
//!
//! The table is persisted as a single bincode file and loaded whole.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    data::date_format,
    error::{Error, Result},
    filter::Filter,
};

const TABLE_VERSION: u32 = 1;

/// One stored day for a country/province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub id: u64,
    pub country_name: String,
    pub province: String,
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
}

impl DailyRecord {
    pub fn key(&self) -> DayKey {
        DayKey {
            country_name: self.country_name.clone(),
            province: self.province.clone(),
            date: self.date,
        }
    }
}

/// A day that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDay {
    pub country_name: String,
    pub province: String,
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
}

impl NewDay {
    pub fn key(&self) -> DayKey {
        DayKey {
            country_name: self.country_name.clone(),
            province: self.province.clone(),
            date: self.date,
        }
    }

    fn into_record(self, id: u64) -> DailyRecord {
        DailyRecord {
            id,
            country_name: self.country_name,
            province: self.province,
            date: self.date,
            confirmed: self.confirmed,
            deaths: self.deaths,
            recovered: self.recovered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey {
    pub country_name: String,
    pub province: String,
    pub date: NaiveDate,
}

impl DayKey {
    fn duplicate(self) -> Error {
        Error::Duplicate {
            country_name: self.country_name,
            province: self.province,
            date: self.date,
        }
    }
}

#[derive(Serialize)]
struct TableFileRef<'a> {
    version: u32,
    next_id: u64,
    records: Vec<&'a DailyRecord>,
}

#[derive(Deserialize)]
struct TableFile {
    version: u32,
    next_id: u64,
    records: Vec<DailyRecord>,
}

#[derive(Debug)]
pub struct Table {
    records: BTreeMap<u64, DailyRecord>,
    unique: HashMap<DayKey, u64>,
    next_id: u64,
}

impl Table {
    pub fn new() -> Self {
        Table {
            records: BTreeMap::new(),
            unique: HashMap::new(),
            next_id: 1,
        }
    }

    /// Loads the table at `path`, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("No table at {path:?}; starting with an empty table");
                return Ok(Table::new());
            }
            Err(err) => return Err(Error::storage(format!("Opening table file {path:?}"), err)),
        };
        let (file, _): (TableFile, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|err| invalid_data(format!("Decoding table file {path:?}"), err))?;
        if file.version != TABLE_VERSION {
            return Err(invalid_data(
                format!("Loading table file {path:?}"),
                format!(
                    "unsupported table version {} (expected {TABLE_VERSION})",
                    file.version
                ),
            ));
        }
        let mut table = Table::new();
        for record in file.records {
            table
                .put(record)
                .map_err(|err| invalid_data(format!("Loading table file {path:?}"), err))?;
        }
        table.next_id = table.next_id.max(file.next_id);
        debug!("Loaded {} day(s) from {path:?}", table.len());
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let context = || format!("Writing table file {path:?}");
        let file = File::create(path).map_err(|err| Error::storage(context(), err))?;
        let mut writer = BufWriter::new(file);
        let contents = TableFileRef {
            version: TABLE_VERSION,
            next_id: self.next_id,
            records: self.records.values().collect(),
        };
        bincode::serde::encode_into_std_write(&contents, &mut writer, bincode::config::standard())
            .map_err(|err| invalid_data(context(), err))?;
        writer.flush().map_err(|err| Error::storage(context(), err))?;
        debug!("Saved {} day(s) to {path:?}", self.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        info!("Removing all {} day(s) from table", self.len());
        self.records.clear();
        self.unique.clear();
    }

    /// Unfiltered query over every day, in id order.
    pub fn query(&self) -> Query<'_> {
        Query {
            table: self,
            filters: Vec::new(),
        }
    }

    pub fn get(&self, id: u64) -> Result<&DailyRecord> {
        debug!("Processing lookup for id={id}");
        self.records.get(&id).ok_or_else(|| {
            Error::NotFound(format!("Day with id: '{id}' was not found in the database."))
        })
    }

    pub fn find_by_key(&self, key: &DayKey) -> Option<&DailyRecord> {
        self.unique.get(key).and_then(|id| self.records.get(id))
    }

    pub fn insert(&mut self, day: NewDay) -> Result<DailyRecord> {
        let key = day.key();
        if self.unique.contains_key(&key) {
            return Err(key.duplicate());
        }
        let record = day.into_record(self.next_id);
        info!(
            "Creating day with date={} for country={}, province={} \
             with confirmed={}, deaths={}, recovered={}",
            record.date,
            record.country_name,
            record.province,
            record.confirmed,
            record.deaths,
            record.recovered
        );
        self.put(record.clone())?;
        Ok(record)
    }

    /// Replaces every attribute of day `id`, keeping its id.
    pub fn update(&mut self, id: u64, day: NewDay) -> Result<DailyRecord> {
        let old_key = self.get(id)?.key();
        let new_key = day.key();
        if self.unique.get(&new_key).is_some_and(|holder| *holder != id) {
            return Err(new_key.duplicate());
        }
        let record = day.into_record(id);
        info!(
            "Saving day with date={} for country={}, province={} \
             with confirmed={}, deaths={}, recovered={}",
            record.date,
            record.country_name,
            record.province,
            record.confirmed,
            record.deaths,
            record.recovered
        );
        self.unique.remove(&old_key);
        self.unique.insert(new_key, id);
        self.records.insert(id, record.clone());
        Ok(record)
    }

    pub fn delete(&mut self, id: u64) -> Result<DailyRecord> {
        let record = self.records.remove(&id).ok_or_else(|| {
            Error::NotFound(format!("Day with id: '{id}' was not found in the database."))
        })?;
        self.unique.remove(&record.key());
        info!(
            "Removing day with date={} for country={}, province={}",
            record.date, record.country_name, record.province
        );
        Ok(record)
    }

    /// Appends a batch atomically: either every day is stored or none is.
    pub fn append_batch(&mut self, batch: Vec<NewDay>) -> Result<usize> {
        let mut seen = HashSet::with_capacity(batch.len());
        for day in &batch {
            let key = day.key();
            if self.unique.contains_key(&key) || !seen.insert(key.clone()) {
                return Err(key.duplicate());
            }
        }
        let appended = batch.len();
        for day in batch {
            let record = day.into_record(self.next_id);
            self.put(record)?;
        }
        debug!("Appended batch of {appended} day(s)");
        Ok(appended)
    }

    fn put(&mut self, record: DailyRecord) -> Result<()> {
        let key = record.key();
        if self.unique.contains_key(&key) {
            return Err(key.duplicate());
        }
        self.unique.insert(key, record.id);
        self.next_id = self.next_id.max(record.id + 1);
        self.records.insert(record.id, record);
        Ok(())
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

fn invalid_data(context: String, err: impl std::fmt::Display) -> Error {
    Error::storage(
        context,
        io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
    )
}

/// A lazily evaluated selection of days: the conjunction of its filters.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    table: &'a Table,
    filters: Vec<Filter>,
}

impl<'a> Query<'a> {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a DailyRecord> + '_ {
        let table: &'a Table = self.table;
        table
            .records
            .values()
            .filter(move |record| self.filters.iter().all(|filter| filter.matches(record)))
    }

    pub fn all(&self) -> Vec<DailyRecord> {
        self.iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }
}
