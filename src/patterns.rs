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
//! Pure analysis functions over a sorted sequence of authentication
//! timestamps. Everything in here is deterministic and independent of the
//! rest of the pipeline.
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

/// Gap above which two authentications belong to different sessions.
const SESSION_GAP: i64 = 15 * 60;
/// Pairwise spacing below which a run counts as frequent reauthentication.
const REAUTH_SPACING: i64 = 2 * 60;
/// Minimum run length for a frequent-reauthentication report.
const REAUTH_MIN_RUN: usize = 3;
/// Gap above which a `long_gap` issue is raised.
const LONG_GAP: i64 = 60 * 60;
/// Pair spacing below which a `rapid_reauth` issue is raised.
const RAPID_PAIR: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: f64,
    pub auth_count: usize,
    pub reauth_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub auth_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequentReauth {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub auth_count: usize,
    pub interval: String,
}

/// Index ranges of maximal runs whose consecutive spacing is <= `max_gap`
/// seconds. A single timestamp forms a run of its own.
fn runs(timestamps: &[DateTime<Utc>], max_gap: i64) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..timestamps.len() {
        if (timestamps[i] - timestamps[i - 1]).num_seconds() > max_gap {
            out.push((start, i));
            start = i;
        }
    }
    if !timestamps.is_empty() {
        out.push((start, timestamps.len()));
    }
    out
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

/// Split into sessions at gaps larger than 15 minutes.
pub fn sessions(timestamps: &[DateTime<Utc>]) -> Vec<Session> {
    runs(timestamps, SESSION_GAP)
        .into_iter()
        .map(|(a, b)| {
            let start = timestamps[a];
            let end = timestamps[b - 1];
            let count = b - a;
            let minutes = minutes_between(start, end);
            let reauth_rate = if count > 1 && minutes > 0.0 {
                format!(
                    "{count} auths in {minutes:.1} min ({:.1}/min)",
                    count as f64 / minutes
                )
            } else if count > 1 {
                format!("{count} auths")
            } else {
                "1 auth".to_string()
            };
            Session {
                start,
                end,
                duration_minutes: minutes,
                auth_count: count,
                reauth_rate,
            }
        })
        .collect()
}

/// Same 15-minute split as [`sessions`], without the per-session rate.
pub fn active_periods(timestamps: &[DateTime<Utc>]) -> Vec<ActivePeriod> {
    runs(timestamps, SESSION_GAP)
        .into_iter()
        .map(|(a, b)| ActivePeriod {
            start: timestamps[a],
            end: timestamps[b - 1],
            auth_count: b - a,
        })
        .collect()
}

/// Runs of at least three authentications, each within two minutes of the
/// next.
pub fn frequent_reauths(timestamps: &[DateTime<Utc>]) -> Vec<FrequentReauth> {
    runs(timestamps, REAUTH_SPACING)
        .into_iter()
        .filter(|&(a, b)| b - a >= REAUTH_MIN_RUN)
        .map(|(a, b)| {
            let count = b - a;
            let total = (timestamps[b - 1] - timestamps[a]).num_seconds();
            let avg = total / (count as i64 - 1);
            FrequentReauth {
                start: timestamps[a],
                end: timestamps[b - 1],
                auth_count: count,
                interval: format!("avg {avg}s"),
            }
        })
        .collect()
}

/// The maximal consecutive-pair delta, if there are at least two points.
pub fn longest_gap(timestamps: &[DateTime<Utc>]) -> Option<Duration> {
    timestamps
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .max()
}

/// Count of authentications per clock hour (UTC); only hours with activity
/// are present.
pub fn hourly_distribution(timestamps: &[DateTime<Utc>]) -> BTreeMap<u32, usize> {
    let mut out = BTreeMap::new();
    for ts in timestamps {
        *out.entry(ts.hour()).or_insert(0) += 1;
    }
    out
}

/// Rule-based summary flags derived from the other analyses.
pub fn potential_issues(timestamps: &[DateTime<Utc>]) -> Vec<String> {
    let mut issues = Vec::new();
    if !frequent_reauths(timestamps).is_empty() {
        issues.push("frequent_reauth".to_string());
    }
    if longest_gap(timestamps)
        .map(|gap| gap.num_seconds() > LONG_GAP)
        .unwrap_or(false)
    {
        issues.push("long_gap".to_string());
    }
    if timestamps
        .windows(2)
        .any(|pair| (pair[1] - pair[0]).num_seconds() < RAPID_PAIR)
    {
        issues.push("rapid_reauth".to_string());
    }
    issues
}
