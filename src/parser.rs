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
//! Module parsing raw relay log lines into [`LogEntry`] records.
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::records::{LogEntry, MessageKind};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line has fewer than four tokens: {0:?}")]
    TooShort(String),
    #[error("unrecognised timestamp prefix: {0:?}")]
    Timestamp(String),
    #[error("missing process token: {0:?}")]
    MissingProcess(String),
}

lazy_static! {
    static ref PROCESS_RE: Regex = Regex::new(r"^(?P<name>[^\[\]]+)\[(?P<pid>\d+)\]:?$").unwrap();
    static ref REPEAT_RE: Regex =
        Regex::new(r"^last message repeated(?: (?P<count>\d+) times?)?$").unwrap();
}

/// Parse one log line against the current wall clock.
pub fn parse_line(line: &str) -> Result<LogEntry, ParseError> {
    parse_line_at(line, Utc::now())
}

/// Parse one log line. `now` anchors the year inference of the legacy syslog
/// timestamp form; it has no effect on the other forms.
pub fn parse_line_at(line: &str, now: DateTime<Utc>) -> Result<LogEntry, ParseError> {
    let tokens = tokenize(line);
    if tokens.len() < 4 {
        return Err(ParseError::TooShort(line.to_string()));
    }

    let (timestamp, consumed) =
        parse_timestamp(&tokens, now).ok_or_else(|| ParseError::Timestamp(line.to_string()))?;

    let hostname = tokens[consumed].1;
    let mut entry = LogEntry::new(timestamp, hostname);

    // `last message repeated N times` has no process token of its own.
    let after_host = tokens
        .get(consumed + 1)
        .map(|&(off, _)| &line[off..])
        .unwrap_or("");
    if let Some(m) = REPEAT_RE.captures(after_host.trim_end()) {
        entry.process = "system".to_string();
        entry.message_kind = MessageKind::Repeat;
        entry.repeat_count = m
            .name("count")
            .and_then(|c| c.as_str().parse::<u64>().ok());
        entry.full_message = after_host.to_string();
        return Ok(entry);
    }

    let &(_, process_token) = tokens
        .get(consumed + 1)
        .ok_or_else(|| ParseError::MissingProcess(line.to_string()))?;
    if let Some(m) = PROCESS_RE.captures(process_token) {
        entry.process = m["name"].to_string();
        entry.pid = m["pid"].parse::<u32>().ok();
    } else {
        entry.process = process_token.trim_end_matches(':').to_string();
    }

    let message = tokens
        .get(consumed + 2)
        .map(|&(off, _)| &line[off..])
        .unwrap_or("");
    entry.full_message = message.to_string();
    entry.message_kind = MessageKind::detect(message);

    if entry.message_kind.carries_auth_fields() {
        scan_auth_fields(&mut entry, &tokens[consumed + 2..]);
    }

    Ok(entry)
}

/// Tokens of the line along with their byte offsets, so that the message tail
/// can be preserved verbatim.
fn tokenize(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut rest = line;
    let mut base = 0;
    loop {
        let trimmed = rest.trim_start();
        base += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            break;
        }
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        tokens.push((base, &trimmed[..end]));
        base += end;
        rest = &trimmed[end..];
    }
    tokens
}

/// Recognise the timestamp prefix, returning the instant and the number of
/// leading tokens it consumed. Precedence: ISO `T` form, space-separated
/// date-time, date only, legacy syslog `Mon DD HH:MM:SS`.
fn parse_timestamp(tokens: &[(usize, &str)], now: DateTime<Utc>) -> Option<(DateTime<Utc>, usize)> {
    let first = tokens[0].1;

    if first.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(first) {
            return Some((dt.with_timezone(&Utc), 1));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(first, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some((naive.and_utc(), 1));
        }
    }

    if tokens.len() >= 2 {
        let joined = format!("{} {}", first, tokens[1].1);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S%.f") {
            return Some((naive.and_utc(), 2));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(first, "%Y-%m-%d") {
        return Some((date.and_hms_opt(0, 0, 0).unwrap().and_utc(), 1));
    }

    if tokens.len() >= 3 {
        let joined = format!("{} {} {}", first, tokens[1].1, tokens[2].1);
        let with_year = format!("{} {}", now.year(), joined);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S") {
            let mut dt = naive.and_utc();
            // year rollover: a December line read early in the next year
            if dt > now && dt.month() == 12 {
                dt = NaiveDateTime::parse_from_str(
                    &format!("{} {}", now.year() - 1, joined),
                    "%Y %b %d %H:%M:%S",
                )
                .ok()?
                .and_utc();
            }
            return Some((dt, 3));
        }
    }

    None
}

/// Capture the tokens following the `user`, `stationid`, `from` and `to`
/// markers of Access-* messages. Markers at end-of-line capture nothing.
fn scan_auth_fields(entry: &mut LogEntry, message_tokens: &[(usize, &str)]) {
    let mut iter = message_tokens.iter().map(|&(_, tok)| tok).peekable();
    while let Some(token) = iter.next() {
        match token {
            "user" => {
                entry.username = iter.next().map(|v| trim_value(v).to_string());
            }
            "stationid" => {
                entry.station_id = iter.next().map(|v| trim_value(v).to_string());
            }
            "from" => {
                entry.realm = iter.next().map(|v| trim_value(v).to_string());
            }
            "to" => {
                if let Some(target) = iter.next() {
                    entry.service_provider = Some(trim_value(target).to_string());
                    if let Some(next) = iter.peek() {
                        if next.starts_with('(') {
                            entry.destination_ip = Some(trim_parenthesised(next).to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    // empty captures are treated as absent
    for field in [
        &mut entry.username,
        &mut entry.station_id,
        &mut entry.realm,
        &mut entry.service_provider,
        &mut entry.destination_ip,
    ] {
        if field.as_deref() == Some("") {
            *field = None;
        }
    }
}

fn trim_value(token: &str) -> &str {
    token.trim_end_matches([',', '.', ';', ':'])
}

fn trim_parenthesised(token: &str) -> &str {
    trim_value(token)
        .trim_start_matches('(')
        .trim_end_matches(')')
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn iso_access_accept_line() {
        let line = "2024-10-14T00:00:02 host-a radiusd[123]: Access-Accept for user \
                    alice@ku.ac.th stationid AA-BB-CC-DD-EE-FF from eduroam.ku.ac.th to \
                    eduroam.example.ac.th (10.0.0.1)";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 10, 14, 0, 0, 2).unwrap()
        );
        assert_eq!(entry.hostname, "host-a");
        assert_eq!(entry.process, "radiusd");
        assert_eq!(entry.pid, Some(123));
        assert_eq!(entry.message_kind, MessageKind::AccessAccept);
        assert_eq!(entry.username.as_deref(), Some("alice@ku.ac.th"));
        assert_eq!(entry.station_id.as_deref(), Some("AA-BB-CC-DD-EE-FF"));
        assert_eq!(entry.realm.as_deref(), Some("eduroam.ku.ac.th"));
        assert_eq!(
            entry.service_provider.as_deref(),
            Some("eduroam.example.ac.th")
        );
        assert_eq!(entry.destination_ip.as_deref(), Some("10.0.0.1"));
        assert!(entry.full_message.starts_with("Access-Accept for user"));
    }

    #[test]
    fn iso_with_offset_normalises_to_utc() {
        let line = "2024-10-14T07:00:02+07:00 host-a radiusd: Access-Reject for user bob@x.org";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 10, 14, 0, 0, 2).unwrap()
        );
        assert_eq!(entry.message_kind, MessageKind::AccessReject);
        assert_eq!(entry.pid, None);
    }

    #[test]
    fn space_separated_datetime() {
        let line = "2024-10-14 08:30:00 relay1 radsecproxy[9]: Accounting-Request from peer";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 10, 14, 8, 30, 0).unwrap()
        );
        assert_eq!(entry.hostname, "relay1");
        assert_eq!(entry.process, "radsecproxy");
        assert_eq!(entry.message_kind, MessageKind::AccountingRequest);
    }

    #[test]
    fn date_only_is_midnight() {
        let line = "2024-10-14 relay1 radiusd: something unusual happened";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 10, 14, 0, 0, 0).unwrap()
        );
        assert_eq!(entry.message_kind, MessageKind::Unknown);
    }

    #[test]
    fn syslog_form_uses_current_year() {
        let line = "Jan 05 23:59:59 relay1 radiusd[7]: Access-Challenge for user carol@y.edu";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2025, 1, 5, 23, 59, 59).unwrap()
        );
        assert_eq!(entry.message_kind, MessageKind::AccessChallenge);
    }

    #[test]
    fn syslog_december_rollover() {
        // read in January 2025, a December instant would land in the future
        let line = "Dec 31 23:00:00 relay1 radiusd: Accounting-Response sent";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn repeat_line() {
        let line = "2024-10-14T00:00:05 host-a last message repeated 3 times";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(entry.process, "system");
        assert_eq!(entry.message_kind, MessageKind::Repeat);
        assert_eq!(entry.repeat_count, Some(3));
    }

    #[test]
    fn markers_with_trailing_punctuation() {
        let line = "2024-10-14T00:00:02 host-a radiusd: Access-Accept for user alice@ku.ac.th, \
                    from eduroam.ku.ac.th, to eduroam.sp.org.";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(entry.username.as_deref(), Some("alice@ku.ac.th"));
        assert_eq!(entry.realm.as_deref(), Some("eduroam.ku.ac.th"));
        assert_eq!(entry.service_provider.as_deref(), Some("eduroam.sp.org"));
        assert_eq!(entry.destination_ip, None);
    }

    #[test]
    fn marker_at_end_of_line_captures_nothing() {
        let line = "2024-10-14T00:00:02 host-a radiusd: Access-Accept for user alice@x.org to";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(entry.username.as_deref(), Some("alice@x.org"));
        assert_eq!(entry.service_provider, None);
        assert_eq!(entry.destination_ip, None);
    }

    #[test]
    fn too_short_and_bad_timestamp_are_errors_not_panics() {
        assert!(matches!(
            parse_line_at("one two three", now()),
            Err(ParseError::TooShort(_))
        ));
        assert!(matches!(
            parse_line_at("nonsense host radiusd: hello there", now()),
            Err(ParseError::Timestamp(_))
        ));
        assert!(parse_line_at("", now()).is_err());
        assert!(parse_line_at("   ", now()).is_err());
    }

    #[test]
    fn full_message_is_verbatim() {
        let line = "2024-10-14T00:00:02 host-a radiusd: Access-Accept   spaced   out";
        let entry = parse_line_at(line, now()).unwrap();
        assert_eq!(entry.full_message, "Access-Accept   spaced   out");
    }
}
