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
//! The federated time-range query engine: per-day jobs fanned out to a
//! fixed worker pool, folded bucket trees streamed over a bounded channel
//! to a single merger task, and a deterministic report at the end.
//!
//! The merger finishes only after every worker has exited and the entry
//! channel has closed; that join order is what makes "no straggling
//! writer" a structural property.
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::records::LogEntry;

pub mod buckets;
pub mod jobs;
pub mod merge;
pub mod result;
pub mod search;

use jobs::Job;
use merge::{Aggregate, RealmMerger, SpMerger};
use result::{RealmActivity, SpActivity};
use search::{SearchClient, SearchError};

/// Fixed size of the query worker pool.
pub const NUM_WORKERS: usize = 10;
/// Bound of the worker-to-merger entry stream.
const ENTRY_CHANNEL_SIZE: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("the requested range contains no days")]
    EmptyRange,
}

/// The merged result of a query run plus its telemetry.
pub struct QueryOutcome<T> {
    pub output: T,
    pub total_hits: u64,
    pub days: usize,
    pub remote_elapsed: Duration,
    pub merge_elapsed: Duration,
    pub overall_elapsed: Duration,
}

/// Fan `job_list` out to [`NUM_WORKERS`] workers, each fetching and folding
/// one day at a time, and merge the resulting entry stream into `A`.
///
/// A worker that fails publishes its error on a size-1 channel (first error
/// wins) and exits; the others keep draining the job queue. The driver
/// inspects the error channel only after all workers and the merger have
/// been joined, and fails the whole run if anything was captured.
pub async fn run_query<A, F, Fut>(
    job_list: Vec<Job>,
    fetch: F,
) -> Result<QueryOutcome<A::Output>, AnalyzerError>
where
    A: Aggregate,
    F: Fn(Job) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(u64, Vec<LogEntry>), SearchError>> + Send + 'static,
{
    if job_list.is_empty() {
        return Err(AnalyzerError::EmptyRange);
    }
    let started = Instant::now();
    let total_jobs = job_list.len();

    let (job_tx, job_rx) = mpsc::channel::<Job>(total_jobs);
    for job in &job_list {
        job_tx.try_send(*job).expect("job channel sized to the job count");
    }
    drop(job_tx);
    let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

    let (entry_tx, mut entry_rx) = mpsc::channel::<LogEntry>(ENTRY_CHANNEL_SIZE);
    let (error_tx, mut error_rx) = mpsc::channel::<SearchError>(1);

    let hits = Arc::new(AtomicU64::new(0));
    let processed = Arc::new(AtomicU32::new(0));

    let bar = ProgressBar::new(total_jobs as u64);
    bar.set_style(
        ProgressStyle::with_template("{pos}/{len} days {wide_bar} {msg}").unwrap(),
    );
    bar.tick();

    // The merger owns the aggregation state while the stream is open and
    // materialises into the shared slot exactly once, under the mutex,
    // after the channel closes.
    let shared: Arc<Mutex<Option<A::Output>>> = Arc::new(Mutex::new(None));
    let merger = {
        let shared = shared.clone();
        tokio::spawn(async move {
            let mut state = A::default();
            while let Some(entry) = entry_rx.recv().await {
                state.absorb(entry);
            }
            *shared.lock().unwrap() = Some(state.finish());
        })
    };

    let mut workers = Vec::with_capacity(NUM_WORKERS);
    for _ in 0..NUM_WORKERS {
        let job_rx = job_rx.clone();
        let entry_tx = entry_tx.clone();
        let error_tx = error_tx.clone();
        let fetch = fetch.clone();
        let hits = hits.clone();
        let processed = processed.clone();
        let bar = bar.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let job = { job_rx.lock().await.recv().await };
                let Some(job) = job else { break };
                match fetch(job).await {
                    Ok((job_hits, entries)) => {
                        hits.fetch_add(job_hits, Ordering::Relaxed);
                        for entry in entries {
                            if entry_tx.send(entry).await.is_err() {
                                return;
                            }
                        }
                        let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        bar.set_position(done as u64);
                        bar.set_message(format!("{} hits", hits.load(Ordering::Relaxed)));
                    }
                    Err(error) => {
                        // first error wins, the rest are dropped
                        let _ = error_tx.try_send(error);
                        return;
                    }
                }
            }
        }));
    }
    drop(entry_tx);
    drop(error_tx);

    for worker in workers {
        worker.await?;
    }
    let remote_elapsed = started.elapsed();

    // every producer is gone, so the merger sees the channel close, drains
    // the backlog and materialises
    let merge_started = Instant::now();
    merger.await?;
    let merge_elapsed = merge_started.elapsed();
    bar.finish_and_clear();

    if let Ok(error) = error_rx.try_recv() {
        return Err(error.into());
    }

    let output = shared
        .lock()
        .unwrap()
        .take()
        .expect("merger materialises before it exits");
    Ok(QueryOutcome {
        output,
        total_hits: hits.load(Ordering::Relaxed),
        days: total_jobs,
        remote_elapsed,
        merge_elapsed,
        overall_elapsed: started.elapsed(),
    })
}

/// Accept-by-realm run over the given per-day jobs.
pub async fn run_realm_query(
    client: SearchClient,
    query: String,
    job_list: Vec<Job>,
) -> Result<QueryOutcome<RealmActivity>, AnalyzerError> {
    let client = Arc::new(client);
    run_query::<RealmMerger, _, _>(job_list, move |job| {
        let client = client.clone();
        let query = query.clone();
        async move {
            let result = client.accept_by_realm(&query, job).await?;
            Ok((result.num_hits, buckets::fold_realm(&result.aggregations)))
        }
    })
    .await
}

/// Accept-by-SP run over the given per-day jobs.
pub async fn run_sp_query(
    client: SearchClient,
    query: String,
    job_list: Vec<Job>,
) -> Result<QueryOutcome<SpActivity>, AnalyzerError> {
    let client = Arc::new(client);
    run_query::<SpMerger, _, _>(job_list, move |job| {
        let client = client.clone();
        let query = query.clone();
        async move {
            let result = client.accept_by_sp(&query, job).await?;
            Ok((result.num_hits, buckets::fold_sp(&result.aggregations)))
        }
    })
    .await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::records::MessageKind;
    use chrono::{NaiveDate, TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn jobs(days: usize) -> Vec<Job> {
        let start = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
        jobs::shard_days(
            start,
            start + chrono::Days::new(days as u64 - 1),
        )
    }

    fn entry(secs: i64, username: &str) -> LogEntry {
        let mut e = LogEntry::new(Utc.timestamp_opt(secs, 0).unwrap(), "");
        e.message_kind = MessageKind::AccessAccept;
        e.username = Some(username.to_string());
        e.service_provider = Some("sp1".to_string());
        e
    }

    #[tokio::test]
    async fn all_jobs_processed_and_merged() {
        let job_list = jobs(25);
        let outcome = run_query::<RealmMerger, _, _>(job_list, |job| async move {
            Ok((2, vec![entry(job.start, "alice@x")]))
        })
        .await
        .unwrap();
        assert_eq!(outcome.days, 25);
        assert_eq!(outcome.total_hits, 50);
        assert_eq!(outcome.output.users["alice@x"].days.len(), 25);
    }

    #[tokio::test]
    async fn first_error_wins_and_fails_the_run() {
        let job_list = jobs(10);
        let failing = [job_list[2].start, job_list[7].start];
        let result = run_query::<RealmMerger, _, _>(job_list, move |job| async move {
            if failing.contains(&job.start) {
                Err(SearchError::Remote(format!("job {} broke", job.start)))
            } else {
                Ok((1, vec![entry(job.start, "alice@x")]))
            }
        })
        .await;
        match result {
            Err(AnalyzerError::Search(SearchError::Remote(msg))) => {
                assert!(msg.contains("broke"));
            }
            other => panic!("expected a search error, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn empty_job_list_is_an_error() {
        let result = run_query::<RealmMerger, _, _>(Vec::new(), |_| async move {
            Ok((0, Vec::new()))
        })
        .await;
        assert!(matches!(result, Err(AnalyzerError::EmptyRange)));
    }

    fn realm_day_payload(day_ms: f64) -> serde_json::Value {
        serde_json::json!({
            "num_hits": 4,
            "aggregations": {
                "unique_users": { "buckets": [
                    {
                        "key": "alice@x",
                        "doc_count": 1,
                        "providers": { "buckets": [{"key": "sp1", "doc_count": 1}] },
                        "daily": { "buckets": [{"key": day_ms, "doc_count": 1}] }
                    },
                    {
                        "key": "bob@x",
                        "doc_count": 3,
                        "providers": { "buckets": [
                            {"key": "sp1", "doc_count": 2},
                            {"key": "sp2", "doc_count": 1}
                        ]},
                        "daily": { "buckets": [{"key": day_ms, "doc_count": 3}] }
                    }
                ]}
            }
        })
    }

    #[tokio::test]
    async fn realm_query_three_days_two_users() {
        let server = MockServer::start().await;
        let job_list = jobs(3);
        for job in &job_list {
            Mock::given(method("POST"))
                .and(path("/api/v1/idx/search"))
                .and(body_partial_json(
                    serde_json::json!({"max_hits": 0, "start_timestamp": job.start}),
                ))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(realm_day_payload(job.start as f64 * 1000.0)),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = SearchClient::new(&server.uri(), "idx", "u", "p").unwrap();
        let outcome = run_realm_query(client, search::realm_query("eduroam.x"), job_list)
            .await
            .unwrap();

        assert_eq!(outcome.days, 3);
        assert_eq!(outcome.total_hits, 12);
        let activity = outcome.output;
        assert_eq!(activity.users.len(), 2);
        assert_eq!(activity.users["alice@x"].days.len(), 3);
        assert_eq!(
            activity.users["alice@x"].providers,
            ["sp1".to_string()].into_iter().collect()
        );
        assert_eq!(activity.users["bob@x"].days.len(), 3);
        assert_eq!(activity.users["bob@x"].providers.len(), 2);
        assert_eq!(activity.providers["sp1"].users.len(), 2);
        assert_eq!(activity.providers["sp2"].users.len(), 1);
    }

    #[tokio::test]
    async fn sp_query_end_to_end() {
        let payload = serde_json::json!({
            "num_hits": 4,
            "aggregations": {
                "by_station": { "buckets": [
                    {
                        "key": "S1",
                        "doc_count": 4,
                        "by_user": { "buckets": [
                            {
                                "key": "alice@r1",
                                "doc_count": 3,
                                "by_realm": { "buckets": [{"key": "r1", "doc_count": 3}] },
                                "auth_times": { "buckets": [
                                    {"key": 1_728_864_000_000.0, "doc_count": 1},
                                    {"key": 1_728_864_060_000.0, "doc_count": 1},
                                    {"key": 1_728_864_120_000.0, "doc_count": 1}
                                ]}
                            },
                            {
                                "key": "bob@r2",
                                "doc_count": 1,
                                "by_realm": { "buckets": [{"key": "r2", "doc_count": 1}] },
                                "auth_times": { "buckets": [
                                    {"key": 1_728_864_000_000.0, "doc_count": 1}
                                ]}
                            }
                        ]}
                    }
                ]}
            }
        });
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(&server.uri(), "idx", "u", "p").unwrap();
        let outcome = run_sp_query(client, search::sp_query("eduroam.x", None), jobs(1))
            .await
            .unwrap();

        let activity = outcome.output;
        assert_eq!(activity.stations.len(), 1);
        let station = &activity.stations["S1"];
        assert_eq!(station.users.len(), 2);
        assert_eq!(station.users["alice@r1"].timestamps.len(), 3);
        assert_eq!(activity.realms.len(), 2);
    }
}
