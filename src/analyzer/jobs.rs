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
//! Time-window arguments and the per-day job shards derived from them.
use chrono::{Days, NaiveDate};

pub const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One unit of query work: a half-open `[start, end)` interval in whole
/// Unix seconds, one day wide.
pub struct Job {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("days must be between 1 and {max}, got {value}")]
    DaysOutOfRange { value: i64, max: u32 },
    #[error("year multiplier must be between 1 and 10, got {0}")]
    YearsOutOfRange(i64),
    #[error("calendar year must be between 2000 and 2100, got {0}")]
    YearOutOfRange(i64),
    #[error("unrecognised time window {0:?} (expected days, Ny, yYYYY or DD-MM-YYYY)")]
    Unrecognised(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Requested reporting window, before anchoring to the wall clock.
pub enum Window {
    LastDays(u32),
    SingleDate(NaiveDate),
    CalendarYear(i32),
}

impl Window {
    pub const MAX_REALM_DAYS: u32 = 366;
    pub const MAX_SP_DAYS: u32 = 3650;

    /// Realm-side surface: a day count or a single `DD-MM-YYYY` date.
    pub fn parse_realm(arg: &str) -> Result<Self, WindowError> {
        Self::parse(arg, Self::MAX_REALM_DAYS, false)
    }

    /// SP-side surface additionally understands `Ny` and `yYYYY`.
    pub fn parse_sp(arg: &str) -> Result<Self, WindowError> {
        Self::parse(arg, Self::MAX_SP_DAYS, true)
    }

    fn parse(arg: &str, max_days: u32, year_forms: bool) -> Result<Self, WindowError> {
        if let Ok(days) = arg.parse::<i64>() {
            if days < 1 || days > max_days as i64 {
                return Err(WindowError::DaysOutOfRange {
                    value: days,
                    max: max_days,
                });
            }
            return Ok(Window::LastDays(days as u32));
        }
        if year_forms {
            if let Some(rest) = arg.strip_prefix('y') {
                if let Ok(year) = rest.parse::<i64>() {
                    if !(2000..=2100).contains(&year) {
                        return Err(WindowError::YearOutOfRange(year));
                    }
                    return Ok(Window::CalendarYear(year as i32));
                }
            }
            if let Some(count) = arg.strip_suffix('y') {
                if let Ok(years) = count.parse::<i64>() {
                    if !(1..=10).contains(&years) {
                        return Err(WindowError::YearsOutOfRange(years));
                    }
                    return Ok(Window::LastDays(years as u32 * 365));
                }
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(arg, "%d-%m-%Y") {
            return Ok(Window::SingleDate(date));
        }
        Err(WindowError::Unrecognised(arg.to_string()))
    }

    /// Anchor to a wall-clock date, yielding the inclusive day interval.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            Window::LastDays(n) => (today - Days::new(n as u64 - 1), today),
            Window::SingleDate(date) => (date, date),
            Window::CalendarYear(year) => (
                NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            ),
        }
    }

    /// Filename fragment: `<N>d`, `YYYYMMDD` or `YYYY`.
    pub fn label(&self) -> String {
        match *self {
            Window::LastDays(n) => format!("{n}d"),
            Window::SingleDate(date) => date.format("%Y%m%d").to_string(),
            Window::CalendarYear(year) => year.to_string(),
        }
    }
}

/// Enumerate the consecutive one-day jobs covering the inclusive date range.
/// The union of the jobs covers the range with no gap and no overlap.
pub fn shard_days(start_date: NaiveDate, end_date: NaiveDate) -> Vec<Job> {
    let mut jobs = Vec::new();
    let mut day = start_date;
    while day <= end_date {
        let start = day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        jobs.push(Job {
            start,
            end: start + SECONDS_PER_DAY,
        });
        day = day.succ_opt().unwrap();
    }
    jobs
}
