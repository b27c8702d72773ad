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
//! Library for shipping eduroam federation authentication logs to a
//! full-text index and answering realm/SP activity questions against it.

pub mod analyzer;
pub mod config;
pub mod ingest;
pub mod parser;
pub mod patterns;
pub mod records;
pub mod report;
pub mod util;

pub mod prelude {
    pub use super::{
        analyzer::{
            jobs::{shard_days, Job, Window},
            result::QueryInfo,
            run_realm_query, run_sp_query,
            search::SearchClient,
        },
        config::{IngestConfig, QueryConfig},
        ingest::{IngestClient, LogTailer},
        records::{LogEntry, MessageKind},
    };
}
