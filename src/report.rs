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
//! Writing the pretty-printed report files under `output/`.
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialising report: {0}")]
    Json(#[from] serde_json::Error),
}

/// `output/<target>/<YYYYMMDD-HHMMSS>-<label>[-station].json`
pub fn output_path(target: &str, label: &str, station: Option<&str>) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    PathBuf::from("output")
        .join(target)
        .join(file_name(&stamp, label, station))
}

fn file_name(stamp: &str, label: &str, station: Option<&str>) -> String {
    match station {
        Some(station) => format!("{stamp}-{label}-{station}.json"),
        None => format!("{stamp}-{label}.json"),
    }
}

/// Create the directory if needed and write the pretty-printed document
/// with mode 0644.
pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_string_pretty(report)?;
    std::fs::write(path, body).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_name_forms() {
        assert_eq!(file_name("20241014-080102", "30d", None), "20241014-080102-30d.json");
        assert_eq!(
            file_name("20241014-080102", "20241014", Some("AA-BB")),
            "20241014-080102-20241014-AA-BB.json"
        );
        assert_eq!(file_name("20241014-080102", "2024", None), "20241014-080102-2024.json");
    }

    #[test]
    fn output_path_layout() {
        let path = output_path("eduroam.x", "7d", None);
        let parts: Vec<_> = path.iter().map(|p| p.to_string_lossy()).collect();
        assert_eq!(parts[0], "output");
        assert_eq!(parts[1], "eduroam.x");
        assert!(parts[2].ends_with("-7d.json"));
    }

    #[test]
    fn write_creates_directories_and_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("x").join("report.json");
        write_report(&path, &serde_json::json!({"summary": {"total_users": 1}})).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("\n  ")); // pretty-printed
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["summary"]["total_users"], 1);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }
}
