use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::Profile,
    error::{self, Error},
    ingest::DEFAULT_BATCH_SIZE,
};

pub use crate::ingest::IfExists;

#[derive(Debug, Parser)]
#[command(author, version, about = "Store and query daily COVID-19 case counts", long_about = None)]
pub struct Cli {
    /// Table file (overrides the profile's DATABASE_*_URI)
    #[arg(long, global = true, env = "COVIZ_DB")]
    pub db: Option<PathBuf>,
    /// Configuration profile
    #[arg(long, global = true, env = "COVIZ_PROFILE", value_enum, default_value = "development")]
    pub profile: Profile,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import the confirmed, deaths and recovered time series into the table
    Import(ImportArgs),
    /// Reshape one wide time-series CSV into long rows
    Reshape(ReshapeArgs),
    /// List days matching `field=operator,value` filters
    List(ListArgs),
    /// Show a single day by id
    Get(IdArgs),
    /// Create a day from a JSON payload
    Create(PayloadArgs),
    /// Replace a day by id with a JSON payload
    Update(UpdateArgs),
    /// Delete a day by id
    Delete(IdArgs),
    /// Find days for a country on a date
    Find(FindArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Directory holding the time_series_covid19_*_global.csv files
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,
    /// Confirmed cases CSV (overrides --data-dir)
    #[arg(long)]
    pub confirmed: Option<PathBuf>,
    /// Deaths CSV (overrides --data-dir)
    #[arg(long)]
    pub deaths: Option<PathBuf>,
    /// Recovered CSV (overrides --data-dir)
    #[arg(long)]
    pub recovered: Option<PathBuf>,
    /// What to do when the table already holds days
    #[arg(long = "if-exists", value_enum, default_value = "append")]
    pub if_exists: IfExists,
    /// Number of days appended per batch
    #[arg(
        long = "batch-size",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_batch_size
    )]
    pub batch_size: usize,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReshapeArgs {
    /// Wide time-series CSV to reshape
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Case type used as the count column name
    #[arg(short, long)]
    pub label: String,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Filters such as `confirmed=ge,100` (repeatable, ANDed)
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// URL query string such as `confirmed=gt,100&confirmed=lt,1500`
    #[arg(long)]
    pub query: Option<String>,
    /// Render output as a table instead of JSON
    #[arg(long)]
    pub table: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    /// Day id
    #[arg(long)]
    pub id: u64,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PayloadSource {
    /// JSON payload
    #[arg(long)]
    pub json: Option<String>,
    /// File containing the JSON payload (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PayloadArgs {
    #[command(flatten)]
    pub payload: PayloadSource,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Day id
    #[arg(long)]
    pub id: u64,
    #[command(flatten)]
    pub payload: PayloadSource,
}

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Country name as stored, e.g. `united_kingdom`
    #[arg(long)]
    pub country: String,
    /// Date as YYYY-MM-DD
    #[arg(long)]
    pub date: String,
    /// Render output as a table instead of JSON
    #[arg(long)]
    pub table: bool,
}

pub fn parse_batch_size(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("Batch size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("Batch size '{value}' is not a number")),
    }
}

/// Splits `field=operator,value` into its key and the `operator,value` part.
pub fn parse_filter_arg(value: &str) -> error::Result<(String, String)> {
    value
        .split_once('=')
        .map(|(field, rest)| (field.trim().to_string(), rest.trim().to_string()))
        .ok_or_else(|| {
            Error::QueryValidation(format!(
                "Filter '{value}' must look like field=operator,value"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_filter_arg_splits_on_first_equals() {
        assert_eq!(
            parse_filter_arg("confirmed=ge,100").unwrap(),
            ("confirmed".to_string(), "ge,100".to_string())
        );
        assert!(matches!(
            parse_filter_arg("confirmed"),
            Err(Error::QueryValidation(_))
        ));
    }

    #[test]
    fn batch_size_must_be_positive() {
        assert_eq!(parse_batch_size("500").unwrap(), 500);
        assert!(parse_batch_size("0").is_err());
        assert!(parse_batch_size("many").is_err());
    }

    #[test]
    fn list_accepts_repeated_filters() {
        let cli = Cli::try_parse_from([
            "coviz",
            "list",
            "--filter",
            "confirmed=gt,100",
            "--filter",
            "confirmed=lt,1500",
        ])
        .unwrap();
        let Commands::List(args) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(args.filters, vec!["confirmed=gt,100", "confirmed=lt,1500"]);
    }
}
