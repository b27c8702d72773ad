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
//! Module defining the record data types exchanged with the indexing service.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
/// Classification of a single log message.
pub enum MessageKind {
    #[serde(rename = "Access-Accept")]
    #[strum(serialize = "Access-Accept")]
    AccessAccept,
    #[serde(rename = "Access-Reject")]
    #[strum(serialize = "Access-Reject")]
    AccessReject,
    #[serde(rename = "Access-Challenge")]
    #[strum(serialize = "Access-Challenge")]
    AccessChallenge,
    #[serde(rename = "Accounting-Request")]
    #[strum(serialize = "Accounting-Request")]
    AccountingRequest,
    #[serde(rename = "Accounting-Response")]
    #[strum(serialize = "Accounting-Response")]
    AccountingResponse,
    #[serde(rename = "repeat")]
    #[strum(serialize = "repeat")]
    Repeat,
    Unknown,
}

impl MessageKind {
    /// All kinds recognised by substring matching, in match precedence order.
    /// `Repeat` is excluded; the "last message repeated" form is detected
    /// structurally by the parser, not by substring.
    const MATCHED: [MessageKind; 5] = [
        MessageKind::AccessAccept,
        MessageKind::AccessReject,
        MessageKind::AccessChallenge,
        MessageKind::AccountingRequest,
        MessageKind::AccountingResponse,
    ];

    /// Classify a message by the first matching kind substring.
    pub fn detect(message: &str) -> Self {
        Self::MATCHED
            .into_iter()
            .find(|kind| message.contains(&kind.to_string()))
            .unwrap_or(MessageKind::Unknown)
    }

    /// Whether field markers (`user`, `stationid`, `from`, `to`) should be
    /// scanned for this kind.
    pub fn carries_auth_fields(&self) -> bool {
        matches!(
            self,
            MessageKind::AccessAccept | MessageKind::AccessReject | MessageKind::AccessChallenge
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
/// One parsed authentication log line, as shipped to the index.
///
/// The timestamp is always set and UTC-normalised to second precision; all
/// optional fields are omitted from the wire format when empty.
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub process: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub message_kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_provider: Option<String>,
    pub full_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_count: Option<u64>,
}

impl LogEntry {
    /// A minimal entry with only the mandatory fields set.
    pub fn new(timestamp: DateTime<Utc>, hostname: impl Into<String>) -> Self {
        LogEntry {
            timestamp,
            hostname: hostname.into(),
            process: String::new(),
            pid: None,
            message_kind: MessageKind::Unknown,
            destination_ip: None,
            username: None,
            station_id: None,
            realm: None,
            service_provider: None,
            full_message: String::new(),
            repeat_count: None,
        }
    }
}
