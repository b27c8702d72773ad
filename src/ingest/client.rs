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
//! Transport to the ingest endpoint: newline-delimited JSON batches with
//! bounded retry and adaptive splitting on oversized payloads.
use std::{collections::VecDeque, time::Duration};

use reqwest::StatusCode;

use crate::records::LogEntry;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const TOO_LARGE_PHRASE: &str = "Payload Too Large";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialising entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("gave up on a slice of {len} entries after {attempts} attempts: {last}")]
    RetriesExhausted {
        len: usize,
        attempts: u32,
        last: String,
    },
    #[error("server rejected a single-entry payload as too large")]
    Unsplittable,
}

/// Non-error outcomes of one POST.
enum PostOutcome {
    Delivered,
    TooLarge,
}

/// Client for `POST <base>/api/v1/<index>/ingest`.
pub struct IngestClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    max_retries: u32,
}

impl IngestClient {
    pub fn new(
        base_url: &str,
        index: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        max_retries: u32,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(IngestClient {
            http,
            url: format!("{}/api/v1/{index}/ingest", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
            max_retries: max_retries.max(1),
        })
    }

    /// One JSON object per line, newline-terminated, nothing else.
    pub fn ndjson_body(entries: &[LogEntry]) -> Result<String, serde_json::Error> {
        let mut body = String::new();
        for entry in entries {
            body.push_str(&serde_json::to_string(entry)?);
            body.push('\n');
        }
        Ok(body)
    }

    /// Deliver a whole batch. On a payload-too-large response the working
    /// slice is halved and both halves are delivered in source order, so no
    /// entry is ever dropped by the splitting itself; the only loss path is
    /// retry exhaustion.
    pub async fn send_batch(&self, entries: &[LogEntry]) -> Result<(), IngestError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pending: VecDeque<&[LogEntry]> = VecDeque::from([entries]);
        while let Some(slice) = pending.pop_front() {
            match self.send_slice(slice).await? {
                PostOutcome::Delivered => {}
                PostOutcome::TooLarge => {
                    if slice.len() <= 1 {
                        return Err(IngestError::Unsplittable);
                    }
                    let mid = slice.len() / 2;
                    log::warn!(
                        "payload of {} entries too large, splitting into {} + {}",
                        slice.len(),
                        mid,
                        slice.len() - mid
                    );
                    pending.push_front(&slice[mid..]);
                    pending.push_front(&slice[..mid]);
                }
            }
        }
        Ok(())
    }

    /// Send one slice with exponential backoff on transient failures.
    async fn send_slice(&self, slice: &[LogEntry]) -> Result<PostOutcome, IngestError> {
        let body = Self::ndjson_body(slice)?;
        let mut attempt = 0u32;
        loop {
            let error = match self.post(&body).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => error,
            };
            attempt += 1;
            if attempt >= self.max_retries {
                return Err(IngestError::RetriesExhausted {
                    len: slice.len(),
                    attempts: attempt,
                    last: error,
                });
            }
            let backoff = Duration::from_secs(1u64 << attempt);
            log::warn!(
                "ingest attempt {attempt}/{} failed ({error}), retrying in {backoff:?}",
                self.max_retries
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn post(&self, body: &str) -> Result<PostOutcome, String> {
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(PostOutcome::Delivered);
        }
        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::PAYLOAD_TOO_LARGE || text.contains(TOO_LARGE_PHRASE) {
            return Ok(PostOutcome::TooLarge);
        }
        Err(format!("status {status}: {text}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::records::MessageKind;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    fn entry(n: usize) -> LogEntry {
        let ts = Utc.with_ymd_and_hms(2024, 10, 14, 0, 0, n as u32 % 60).unwrap();
        LogEntry {
            process: "radiusd".to_string(),
            message_kind: MessageKind::AccessAccept,
            username: Some(format!("user{n}@example.org")),
            full_message: format!("Access-Accept for user user{n}@example.org"),
            ..LogEntry::new(ts, "host-a")
        }
    }

    fn entries(n: usize) -> Vec<LogEntry> {
        (0..n).map(entry).collect()
    }

    /// Matches requests whose NDJSON body has more than `0.max` lines.
    struct MoreLinesThan(usize);

    impl Match for MoreLinesThan {
        fn matches(&self, request: &Request) -> bool {
            let body = String::from_utf8_lossy(&request.body);
            body.lines().count() > self.0
        }
    }

    #[test]
    fn ndjson_body_shape() {
        let batch = entries(3);
        let body = IngestClient::ndjson_body(&batch).unwrap();
        assert!(body.ends_with('\n'));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            let back: LogEntry = serde_json::from_str(line).unwrap();
            assert_eq!(back.username.as_deref(), Some(&*format!("user{i}@example.org")));
        }
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = IngestClient::new(&server.uri(), "eduroam-auth", "u", "p", 3).unwrap();
        client.send_batch(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn single_entry_single_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/eduroam-auth/ingest"))
            .and(basic_auth("u", "p"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let client = IngestClient::new(&server.uri(), "eduroam-auth", "u", "p", 3).unwrap();
        client.send_batch(&entries(1)).await.unwrap();
    }

    #[tokio::test]
    async fn adaptive_halving_loses_nothing() {
        let server = MockServer::start().await;
        // anything over 10 entries is too large
        Mock::given(method("POST"))
            .and(MoreLinesThan(10))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = IngestClient::new(&server.uri(), "eduroam-auth", "u", "p", 3).unwrap();
        client.send_batch(&entries(40)).await.unwrap();

        // reassemble everything the server accepted, in arrival order
        let accepted: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.body).to_string())
            .filter(|body| body.lines().count() <= 10)
            .flat_map(|body| body.lines().map(str::to_string).collect::<Vec<_>>())
            .collect();
        assert_eq!(accepted.len(), 40);
        for (i, line) in accepted.iter().enumerate() {
            let back: LogEntry = serde_json::from_str(line).unwrap();
            assert_eq!(back.username.as_deref(), Some(&*format!("user{i}@example.org")));
        }
    }

    #[tokio::test]
    async fn too_large_phrase_in_body_triggers_split() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(MoreLinesThan(1))
            .respond_with(ResponseTemplate::new(400).set_body_string("Payload Too Large"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = IngestClient::new(&server.uri(), "eduroam-auth", "u", "p", 3).unwrap();
        client.send_batch(&entries(2)).await.unwrap();
        let posts = server.received_requests().await.unwrap();
        // one rejected double, then two singles
        assert_eq!(posts.len(), 3);
    }

    #[tokio::test]
    async fn single_entry_too_large_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;
        let client = IngestClient::new(&server.uri(), "eduroam-auth", "u", "p", 3).unwrap();
        let err = client.send_batch(&entries(1)).await.unwrap_err();
        assert!(matches!(err, IngestError::Unsplittable));
    }

    #[tokio::test]
    async fn server_error_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let client = IngestClient::new(&server.uri(), "eduroam-auth", "u", "p", 1).unwrap();
        let err = client.send_batch(&entries(2)).await.unwrap_err();
        match err {
            IngestError::RetriesExhausted { len, attempts, last } => {
                assert_eq!(len, 2);
                assert_eq!(attempts, 1);
                assert!(last.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
