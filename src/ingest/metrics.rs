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
//! Periodic polling of the remote `/metrics` endpoint. Document-level
//! indexing failures only ever surface here; the delivery path treats
//! HTTP 200 as success.
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PROCESSED_DOCS_RE: Regex = Regex::new(
        r#"^quickwit_indexing_processed_docs_total\{(?P<labels>[^}]*)\}\s+(?P<value>[0-9.eE+]+)"#
    )
    .unwrap();
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Indexer document counters for one index.
pub struct IndexingCounters {
    pub valid: u64,
    pub doc_mapper_error: u64,
    pub json_parse_error: u64,
}

impl IndexingCounters {
    pub fn errors(&self) -> u64 {
        self.doc_mapper_error + self.json_parse_error
    }
}

/// Extract the `quickwit_indexing_processed_docs_total` counters for `index`
/// from a Prometheus exposition body. Unknown statuses and other indexes are
/// ignored.
pub fn parse_metrics(text: &str, index: &str) -> IndexingCounters {
    let index_label = format!("index=\"{index}\"");
    let mut counters = IndexingCounters::default();
    for line in text.lines() {
        let Some(m) = PROCESSED_DOCS_RE.captures(line) else {
            continue;
        };
        let labels = &m["labels"];
        if !labels.contains(&index_label) {
            continue;
        }
        let Ok(value) = m["value"].parse::<f64>() else {
            continue;
        };
        let value = value as u64;
        if labels.contains("docs_processed_status=\"valid\"") {
            counters.valid = value;
        } else if labels.contains("docs_processed_status=\"doc_mapper_error\"") {
            counters.doc_mapper_error = value;
        } else if labels.contains("docs_processed_status=\"json_parse_error\"") {
            counters.json_parse_error = value;
        }
    }
    counters
}

/// Background task that keeps polling the indexer statistics and logs
/// movement of the counters. Failures are logged and retried on the next
/// tick; the poller never takes the pipeline down.
pub struct MetricsPoller {
    http: reqwest::Client,
    url: String,
    index: String,
    interval: Duration,
}

impl MetricsPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(base_url: &str, index: impl Into<String>, interval: Duration) -> Self {
        MetricsPoller {
            http: reqwest::Client::new(),
            url: format!("{}/metrics", base_url.trim_end_matches('/')),
            index: index.into(),
            interval,
        }
    }

    pub async fn run(self) {
        let mut last = IndexingCounters::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let counters = match self.fetch().await {
                Ok(counters) => counters,
                Err(error) => {
                    log::warn!("metrics poll failed: {error}");
                    continue;
                }
            };
            if counters != last {
                log::info!(
                    "index {:?}: {} docs indexed, {} doc mapper errors, {} json parse errors",
                    self.index,
                    counters.valid,
                    counters.doc_mapper_error,
                    counters.json_parse_error
                );
                if counters.errors() > last.errors() {
                    log::warn!(
                        "indexer rejected {} documents since last poll",
                        counters.errors() - last.errors()
                    );
                }
                last = counters;
            }
        }
    }

    async fn fetch(&self) -> Result<IndexingCounters, reqwest::Error> {
        let text = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_metrics(&text, &self.index))
    }
}
