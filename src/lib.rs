pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod io_utils;
pub mod service;
pub mod store;
pub mod table;

use std::{env, fs, io::Read, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands, PayloadSource},
    config::Config,
    ingest::{ImportOptions, SeriesPaths},
    store::{DailyRecord, Table},
};

pub use crate::error::Error;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("coviz", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    if let Commands::Reshape(args) = &cli.command {
        return handle_reshape(args);
    }
    let data_dir = match &cli.command {
        Commands::Import(args) => args.data_dir.as_deref(),
        _ => None,
    };
    let config = Config::resolve(cli.profile, cli.db.as_deref(), data_dir)?;
    debug!("Resolved configuration: {config:?}");
    match cli.command {
        Commands::Import(args) => handle_import(&args, &config),
        Commands::Reshape(args) => handle_reshape(&args),
        Commands::List(args) => handle_list(&args, &config),
        Commands::Get(args) => {
            let table = open_table(&config)?;
            print_json(&service::get_day(&table, args.id)?)
        }
        Commands::Create(args) => {
            let payload = read_payload(&args.payload)?;
            let mut table = open_table(&config)?;
            let day = service::create_day(&mut table, &payload)?;
            save_table(&table, &config)?;
            info!("day created with id {}", day.id);
            print_json(&day)
        }
        Commands::Update(args) => {
            let payload = read_payload(&args.payload)?;
            let mut table = open_table(&config)?;
            let day = service::update_day(&mut table, args.id, &payload)?;
            save_table(&table, &config)?;
            print_json(&day)
        }
        Commands::Delete(args) => {
            let mut table = open_table(&config)?;
            let day = service::delete_day(&mut table, args.id)?;
            save_table(&table, &config)?;
            info!("day {} deleted", day.id);
            Ok(())
        }
        Commands::Find(args) => {
            let table = open_table(&config)?;
            let days = service::find_days(&table, &args.country, &args.date)?;
            print_days(&days, args.table)
        }
    }
}

fn handle_import(args: &cli::ImportArgs, config: &Config) -> Result<()> {
    let defaults = SeriesPaths::in_dir(&config.data_dir);
    let paths = SeriesPaths {
        confirmed: args.confirmed.clone().unwrap_or(defaults.confirmed),
        deaths: args.deaths.clone().unwrap_or(defaults.deaths),
        recovered: args.recovered.clone().unwrap_or(defaults.recovered),
    };
    let options = ImportOptions {
        if_exists: args.if_exists,
        batch_size: args.batch_size,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    };
    let mut table = open_table(config)?;
    let result = ingest::import_series(&mut table, &paths, &options);
    // appended batches stay appended even when a later one fails
    save_table(&table, config)?;
    let summary =
        result.with_context(|| format!("Importing time series into {:?}", config.database))?;
    info!(
        "Imported {} of {} merged day(s) into {:?}",
        summary.appended, summary.merged, config.database
    );
    Ok(())
}

fn handle_reshape(args: &cli::ReshapeArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let series = ingest::reshape(&args.input, &args.label).with_encoding(encoding);
    let mut writer = io_utils::open_csv_writer(args.output.as_deref())?;
    writer
        .write_record(["date", "country_name", "province", series.label()])
        .context("Writing reshaped headers")?;
    let mut rows = 0usize;
    for row in series.rows()? {
        let row = row.with_context(|| format!("Reshaping {:?}", series.path()))?;
        writer
            .write_record([
                data::format_date(row.date),
                row.country_name,
                row.province,
                row.count.to_string(),
            ])
            .context("Writing reshaped row")?;
        rows += 1;
    }
    writer.flush().context("Flushing reshaped output")?;
    info!("Reshaped {rows} row(s) from {:?}", series.path());
    Ok(())
}

fn handle_list(args: &cli::ListArgs, config: &Config) -> Result<()> {
    let mut pairs = match &args.query {
        Some(query) => filter::parse_query_string(query)?,
        None => Vec::new(),
    };
    for raw in &args.filters {
        pairs.push(cli::parse_filter_arg(raw)?);
    }
    let table = open_table(config)?;
    let days = service::list_days(&table, &pairs)?;
    print_days(&days, args.table)
}

fn open_table(config: &Config) -> Result<Table> {
    Table::load(&config.database)
        .with_context(|| format!("Loading table from {:?}", config.database))
}

fn save_table(table: &Table, config: &Config) -> Result<()> {
    table
        .save(&config.database)
        .with_context(|| format!("Saving table to {:?}", config.database))
}

fn read_payload(source: &PayloadSource) -> Result<serde_json::Value> {
    let raw = match (&source.json, &source.input) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) if io_utils::is_dash(path) => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading payload from stdin")?;
            buffer
        }
        (None, Some(path)) => read_payload_file(path)?,
        (None, None) => anyhow::bail!("Provide a payload with --json or --input"),
    };
    serde_json::from_str(&raw).map_err(|err| {
        anyhow::Error::from(Error::DataValidation(format!(
            "Body of request is not valid JSON: {err}"
        )))
    })
}

fn read_payload_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Reading payload from {path:?}"))
}

fn print_days(days: &[DailyRecord], as_table: bool) -> Result<()> {
    if as_table {
        table::print_records(days);
        Ok(())
    } else {
        print_json(days)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing output")?;
    println!("{rendered}");
    Ok(())
}
