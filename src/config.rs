//! Runtime configuration.
//!
//! The table location depends on the profile: `DATABASE_DEV_URI`,
//! `DATABASE_TEST_URI` or `DATABASE_PRODUCTION_URI`, with `site.db` and
//! `test.db` as development and testing fallbacks. Production has no
//! fallback. A `sqlite:///` prefix is accepted and stripped so existing
//! connection strings keep working. `--db` overrides all of this.

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use clap::ValueEnum;

pub const DATA_DIR_ENV: &str = "COVIZ_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "data/COVID-19/csse_covid_19_data/csse_covid_19_time_series";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Profile {
    #[default]
    Development,
    Testing,
    Production,
}

impl Profile {
    fn database_env(self) -> &'static str {
        match self {
            Profile::Development => "DATABASE_DEV_URI",
            Profile::Testing => "DATABASE_TEST_URI",
            Profile::Production => "DATABASE_PRODUCTION_URI",
        }
    }

    fn default_database(self) -> Option<&'static str> {
        match self {
            Profile::Development => Some("site.db"),
            Profile::Testing => Some("test.db"),
            Profile::Production => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub profile: Profile,
    pub database: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn resolve(
        profile: Profile,
        database: Option<&Path>,
        data_dir: Option<&Path>,
    ) -> Result<Self> {
        Self::resolve_with(profile, database, data_dir, |key| env::var(key).ok())
    }

    pub fn resolve_with<F>(
        profile: Profile,
        database: Option<&Path>,
        data_dir: Option<&Path>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match database {
            Some(path) => path.to_path_buf(),
            None => {
                let key = profile.database_env();
                let uri = lookup(key)
                    .filter(|value| !value.trim().is_empty())
                    .or_else(|| profile.default_database().map(str::to_string))
                    .ok_or_else(|| anyhow!("{key} must be set for the {profile:?} profile"))?;
                database_path(&uri)
            }
        };
        let data_dir = match data_dir {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(
                lookup(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
        };
        Ok(Config {
            profile,
            database,
            data_dir,
        })
    }
}

fn database_path(uri: &str) -> PathBuf {
    let trimmed = uri.trim();
    PathBuf::from(trimmed.strip_prefix("sqlite:///").unwrap_or(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn development_defaults_to_site_db() {
        let config = Config::resolve_with(Profile::Development, None, None, no_env).unwrap();
        assert_eq!(config.database, PathBuf::from("site.db"));
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn profile_variable_wins_and_sqlite_prefix_is_stripped() {
        let config = Config::resolve_with(Profile::Testing, None, None, |key| {
            (key == "DATABASE_TEST_URI").then(|| "sqlite:///tmp/test.db".to_string())
        })
        .unwrap();
        assert_eq!(config.database, PathBuf::from("tmp/test.db"));
    }

    #[test]
    fn production_requires_its_variable() {
        let err = Config::resolve_with(Profile::Production, None, None, no_env).unwrap_err();
        assert!(err.to_string().contains("DATABASE_PRODUCTION_URI"));
        let config = Config::resolve_with(
            Profile::Production,
            Some(Path::new("prod.db")),
            Some(Path::new("series")),
            no_env,
        )
        .unwrap();
        assert_eq!(config.database, PathBuf::from("prod.db"));
        assert_eq!(config.data_dir, PathBuf::from("series"));
    }
}
