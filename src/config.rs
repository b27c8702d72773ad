// roamtrace: Ingestion and Activity Analysis of eduroam Federation RADIUS Logs
// Copyright (C) 2024-2025 The roamtrace developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Module reading the `key=value` properties files of both tool families.
use std::{collections::HashMap, env, path::Path, path::PathBuf};

pub const DEFAULT_BATCH_SIZE: usize = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INDEX: &str = "eduroam-auth";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("missing required key {0:?}")]
    MissingKey(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    BadValue { key: &'static str, value: String },
}

/// Parse a properties file body: `key=value` pairs, `#` comments and blank
/// lines ignored. A value beginning with `=` has that character stripped.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value.strip_prefix('=').unwrap_or(value);
        map.insert(key.trim().to_string(), value.to_string());
    }
    map
}

fn read_properties(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_properties(&text))
}

#[derive(Debug, Clone)]
/// Settings of the ingestion binary.
pub struct IngestConfig {
    pub log_file_path: PathBuf,
    pub quickwit_url: String,
    pub username: String,
    pub password: String,
    pub index: String,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl IngestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let map = read_properties(path)?;
        Self::from_map(map)
    }

    fn from_map(map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            map.get(key)
                .cloned()
                .ok_or(ConfigError::MissingKey(key))
        };
        let batch_size = match map.get("batchSize") {
            Some(raw) => raw.parse::<usize>().map_err(|_| ConfigError::BadValue {
                key: "batchSize",
                value: raw.clone(),
            })?,
            None => DEFAULT_BATCH_SIZE,
        };
        let max_retries = match map.get("maxRetries") {
            Some(raw) => raw.parse::<u32>().map_err(|_| ConfigError::BadValue {
                key: "maxRetries",
                value: raw.clone(),
            })?,
            None => DEFAULT_MAX_RETRIES,
        };
        Ok(IngestConfig {
            log_file_path: PathBuf::from(required("logFilePath")?),
            quickwit_url: required("quickwitURL")?,
            username: required("username")?,
            password: required("password")?,
            index: map
                .get("indexName")
                .cloned()
                .unwrap_or_else(|| DEFAULT_INDEX.to_string()),
            batch_size,
            max_retries,
        })
    }
}

#[derive(Debug, Clone)]
/// Settings of the query-side tools, read from `qw-auth.properties` with the
/// process environment as fallback.
pub struct QueryConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub index: String,
}

impl QueryConfig {
    pub const DEFAULT_PATH: &'static str = "qw-auth.properties";

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let map = if path.exists() {
            read_properties(path)?
        } else {
            HashMap::new()
        };
        let lookup = |key: &'static str| {
            map.get(key)
                .cloned()
                .or_else(|| env::var(key).ok())
                .ok_or(ConfigError::MissingKey(key))
        };
        Ok(QueryConfig {
            base_url: lookup("QW_URL")?,
            username: lookup("QW_USER")?,
            password: lookup("QW_PASS")?,
            index: lookup("QW_INDEX").unwrap_or_else(|_| DEFAULT_INDEX.to_string()),
        })
    }
}
