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
//! Client for the aggregation search endpoint. Hits are never materialised;
//! every request carries `max_hits: 0` and one of the two supported
//! aggregation trees.
use std::time::Duration;

use serde_json::{json, Value};

use super::buckets::{RealmAggregations, SpAggregations};
use super::jobs::Job;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote error: {0}")]
    Remote(String),
    #[error("malformed aggregation response: {0}")]
    Shape(String),
}

/// A decoded search response: the remote hit count and the typed
/// aggregation tree.
#[derive(Debug)]
pub struct SearchResult<A> {
    pub num_hits: u64,
    pub aggregations: A,
}

/// Client for `POST <base>/api/v1/<index>/search`.
pub struct SearchClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl SearchClient {
    pub fn new(
        base_url: &str,
        index: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(SearchClient {
            http,
            url: format!("{}/api/v1/{index}/search", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Users of one realm: who was active, with which providers, on which
    /// days.
    pub async fn accept_by_realm(
        &self,
        query: &str,
        job: Job,
    ) -> Result<SearchResult<RealmAggregations>, SearchError> {
        let body = realm_request(query, job);
        let raw = self.post(body).await?;
        self.decode(raw)
    }

    /// Stations seen at one service provider, with per-user minute-level
    /// authentication times.
    pub async fn accept_by_sp(
        &self,
        query: &str,
        job: Job,
    ) -> Result<SearchResult<SpAggregations>, SearchError> {
        let body = sp_request(query, job);
        let raw = self.post(body).await?;
        self.decode(raw)
    }

    async fn post(&self, body: Value) -> Result<Value, SearchError> {
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let value: Value = response.json().await?;
        if let Some(error) = value.get("error") {
            return Err(SearchError::Remote(error.to_string()));
        }
        Ok(value)
    }

    fn decode<A: serde::de::DeserializeOwned>(
        &self,
        raw: Value,
    ) -> Result<SearchResult<A>, SearchError> {
        let num_hits = raw
            .get("num_hits")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let aggregations = raw
            .get("aggregations")
            .cloned()
            .ok_or_else(|| SearchError::Shape("missing aggregations".to_string()))?;
        let aggregations =
            serde_json::from_value(aggregations).map_err(|e| SearchError::Shape(e.to_string()))?;
        Ok(SearchResult {
            num_hits,
            aggregations,
        })
    }
}

/// `message_kind:"Access-Accept"` restricted to one realm, and optionally
/// one station.
pub fn realm_query(realm: &str) -> String {
    format!("message_kind:\"Access-Accept\" AND realm:\"{realm}\"")
}

pub fn sp_query(service_provider: &str, station: Option<&str>) -> String {
    let mut query =
        format!("message_kind:\"Access-Accept\" AND service_provider:\"{service_provider}\"");
    if let Some(station) = station {
        query.push_str(&format!(" AND station_id:\"{station}\""));
    }
    query
}

fn realm_request(query: &str, job: Job) -> Value {
    json!({
        "query": query,
        "start_timestamp": job.start,
        "end_timestamp": job.end,
        "max_hits": 0,
        "aggs": {
            "unique_users": {
                "terms": { "field": "username", "size": 10_000 },
                "aggs": {
                    "providers": {
                        "terms": { "field": "service_provider", "size": 1_000 }
                    },
                    "daily": {
                        "date_histogram": { "field": "timestamp", "fixed_interval": "86400s" }
                    }
                }
            }
        }
    })
}

fn sp_request(query: &str, job: Job) -> Value {
    json!({
        "query": query,
        "start_timestamp": job.start,
        "end_timestamp": job.end,
        "max_hits": 0,
        "aggs": {
            "by_station": {
                "terms": { "field": "station_id", "size": 1_000 },
                "aggs": {
                    "by_user": {
                        "terms": { "field": "username", "size": 100 },
                        "aggs": {
                            "by_realm": {
                                "terms": { "field": "realm", "size": 10 }
                            },
                            "auth_times": {
                                "date_histogram": { "field": "timestamp", "fixed_interval": "60s" }
                            }
                        }
                    }
                }
            }
        }
    })
}
