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
//! Typed views of the nested aggregation trees, and the fold turning them
//! into a stream of synthetic [`LogEntry`] values.
//!
//! The required top-level aggregation is decoded strictly (a missing path
//! fails the whole job); everything below is decoded bucket by bucket, and a
//! bucket that does not have the expected shape is skipped, not failed.
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::records::{LogEntry, MessageKind};

#[derive(Debug, Deserialize)]
pub struct TermsAgg<B> {
    #[serde(default = "Vec::new")]
    pub buckets: Vec<B>,
}

impl<B> Default for TermsAgg<B> {
    fn default() -> Self {
        TermsAgg { buckets: Vec::new() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistogramAgg {
    #[serde(default)]
    pub buckets: Vec<HistogramBucket>,
}

#[derive(Debug, Deserialize)]
pub struct HistogramBucket {
    /// Milliseconds since the epoch.
    pub key: f64,
    #[serde(default)]
    pub doc_count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyBucket {
    pub key: Value,
    #[serde(default)]
    pub doc_count: u64,
}

/// Response tree of the accept-by-realm shape.
#[derive(Debug, Deserialize)]
pub struct RealmAggregations {
    pub unique_users: TermsAgg<Value>,
}

#[derive(Debug, Deserialize)]
struct UserBucket {
    key: Value,
    #[serde(default)]
    providers: TermsAgg<KeyBucket>,
    #[serde(default)]
    daily: HistogramAgg,
}

/// Response tree of the accept-by-SP shape.
#[derive(Debug, Deserialize)]
pub struct SpAggregations {
    pub by_station: TermsAgg<Value>,
}

#[derive(Debug, Deserialize)]
struct StationBucket {
    key: Value,
    #[serde(default)]
    by_user: TermsAgg<Value>,
}

#[derive(Debug, Deserialize)]
struct SpUserBucket {
    key: Value,
    #[serde(default)]
    by_realm: TermsAgg<KeyBucket>,
    #[serde(default)]
    auth_times: HistogramAgg,
}

fn key_str(key: &Value) -> Option<&str> {
    key.as_str()
}

fn leaf_instant(bucket: &HistogramBucket) -> Option<DateTime<Utc>> {
    let seconds = (bucket.key / 1000.0) as i64;
    Utc.timestamp_opt(seconds, 0).single()
}

fn synthetic(timestamp: DateTime<Utc>) -> LogEntry {
    let mut entry = LogEntry::new(timestamp, "");
    entry.message_kind = MessageKind::AccessAccept;
    entry
}

/// Flatten an accept-by-realm tree. One entry per provider per non-empty
/// daily leaf; a user without a provider sub-aggregation still contributes
/// their active days.
pub fn fold_realm(aggs: &RealmAggregations) -> Vec<LogEntry> {
    let mut out = Vec::new();
    for raw in &aggs.unique_users.buckets {
        let Ok(user) = serde_json::from_value::<UserBucket>(raw.clone()) else {
            log::debug!("skipping malformed user bucket");
            continue;
        };
        let Some(username) = key_str(&user.key) else {
            log::debug!("skipping user bucket with non-string key");
            continue;
        };
        let providers: Vec<&str> = user
            .providers
            .buckets
            .iter()
            .filter_map(|b| key_str(&b.key))
            .collect();
        for leaf in &user.daily.buckets {
            if leaf.doc_count == 0 {
                continue;
            }
            let Some(timestamp) = leaf_instant(leaf) else {
                continue;
            };
            if providers.is_empty() {
                let mut entry = synthetic(timestamp);
                entry.username = Some(username.to_string());
                out.push(entry);
            } else {
                for provider in &providers {
                    let mut entry = synthetic(timestamp);
                    entry.username = Some(username.to_string());
                    entry.service_provider = Some(provider.to_string());
                    out.push(entry);
                }
            }
        }
    }
    out
}

/// Flatten an accept-by-SP tree. One entry per non-empty minute leaf,
/// carrying the station, the user and the user's dominant realm.
pub fn fold_sp(aggs: &SpAggregations) -> Vec<LogEntry> {
    let mut out = Vec::new();
    for raw in &aggs.by_station.buckets {
        let Ok(station) = serde_json::from_value::<StationBucket>(raw.clone()) else {
            log::debug!("skipping malformed station bucket");
            continue;
        };
        let Some(station_id) = key_str(&station.key) else {
            log::debug!("skipping station bucket with non-string key");
            continue;
        };
        for raw_user in &station.by_user.buckets {
            let Ok(user) = serde_json::from_value::<SpUserBucket>(raw_user.clone()) else {
                log::debug!("skipping malformed user bucket under station {station_id}");
                continue;
            };
            let Some(username) = key_str(&user.key) else {
                continue;
            };
            // terms buckets arrive ordered by document count, so the first
            // string key is the user's dominant realm
            let realm = user
                .by_realm
                .buckets
                .iter()
                .find_map(|b| key_str(&b.key))
                .map(str::to_string);
            for leaf in &user.auth_times.buckets {
                if leaf.doc_count == 0 {
                    continue;
                }
                let Some(timestamp) = leaf_instant(leaf) else {
                    continue;
                };
                let mut entry = synthetic(timestamp);
                entry.station_id = Some(station_id.to_string());
                entry.username = Some(username.to_string());
                entry.realm = realm.clone();
                out.push(entry);
            }
        }
    }
    out
}
