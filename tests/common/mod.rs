#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Directory holding the three global time-series fixtures.
pub fn series_dir() -> PathBuf {
    fixture_path("series")
}

/// Scratch directory with its own table file, cleaned up on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Table file used by every command run through [`TestWorkspace::coviz`].
    pub fn db(&self) -> PathBuf {
        self.temp_dir.path().join("days.db")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// The binary pointed at this workspace's table, isolated from the caller's env.
    pub fn coviz(&self) -> Command {
        let mut cmd = Command::cargo_bin("coviz").expect("binary exists");
        cmd.env_remove("COVIZ_PROFILE")
            .env_remove("COVIZ_DATA_DIR")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(self.db());
        cmd
    }
}

pub fn day_json(country: &str, province: &str, date: &str, confirmed: i64) -> String {
    serde_json::json!({
        "country_name": country,
        "province": province,
        "date": date,
        "confirmed": confirmed,
        "deaths": 1,
        "recovered": 2
    })
    .to_string()
}
