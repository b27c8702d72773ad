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
//! Aggregated activity state and the sorted report documents derived from
//! it. Maps are kept as `BTreeMap`/`BTreeSet` so that two identical runs
//! produce byte-identical reports.
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::patterns;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UserStats {
    /// Distinct days with at least one accepted authentication.
    pub days: BTreeSet<NaiveDate>,
    pub providers: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProviderStats {
    pub users: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UserActivity {
    pub realm: Option<String>,
    /// Sorted, duplicate-free at the granularity the histogram reports.
    pub timestamps: BTreeSet<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StationStats {
    pub users: BTreeMap<String, UserActivity>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RealmStats {
    pub stations: BTreeSet<String>,
    pub users: BTreeSet<String>,
}

/// Accept-by-realm aggregation state. Both maps are filled in one pass and
/// stay mutually consistent: a user appears in a provider's user set iff
/// that pair was observed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RealmActivity {
    pub users: BTreeMap<String, UserStats>,
    pub providers: BTreeMap<String, ProviderStats>,
}

/// Accept-by-SP aggregation state, with the symmetric station/realm
/// cross-maps.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpActivity {
    pub stations: BTreeMap<String, StationStats>,
    pub realms: BTreeMap<String, RealmStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryInfo {
    pub target: String,
    pub query: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: usize,
    pub total_hits: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RealmSummary {
    pub total_users: usize,
    pub total_providers: usize,
}

#[derive(Debug, Serialize)]
pub struct UserReport {
    pub username: String,
    pub days_active: usize,
    pub providers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderReport {
    pub provider: String,
    pub user_count: usize,
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RealmReport {
    pub query_info: QueryInfo,
    pub description: String,
    pub summary: RealmSummary,
    pub users: Vec<UserReport>,
    pub providers: Vec<ProviderReport>,
}

impl RealmActivity {
    /// Materialise the sorted report: users by descending days-active,
    /// providers by descending user count, username/name breaking ties.
    pub fn into_report(self, query_info: QueryInfo) -> RealmReport {
        let users = self
            .users
            .into_iter()
            .map(|(username, stats)| UserReport {
                username,
                days_active: stats.days.len(),
                providers: stats.providers.into_iter().collect(),
            })
            .sorted_by(|a, b| {
                b.days_active
                    .cmp(&a.days_active)
                    .then_with(|| a.username.cmp(&b.username))
            })
            .collect_vec();
        let providers = self
            .providers
            .into_iter()
            .map(|(provider, stats)| ProviderReport {
                provider,
                user_count: stats.users.len(),
                users: stats.users.into_iter().collect(),
            })
            .sorted_by(|a, b| {
                b.user_count
                    .cmp(&a.user_count)
                    .then_with(|| a.provider.cmp(&b.provider))
            })
            .collect_vec();
        let description = format!(
            "Users of realm {} with accepted authentications between {} and {}",
            query_info.target, query_info.start_date, query_info.end_date
        );
        RealmReport {
            summary: RealmSummary {
                total_users: users.len(),
                total_providers: providers.len(),
            },
            description,
            query_info,
            users,
            providers,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpSummary {
    pub unique_stations: usize,
    pub unique_users: usize,
    pub unique_realms: usize,
}

#[derive(Debug, Serialize)]
pub struct StationUserReport {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    pub auth_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sessions: Vec<patterns::Session>,
    pub active_periods: Vec<patterns::ActivePeriod>,
    pub frequent_reauths: Vec<patterns::FrequentReauth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_gap_minutes: Option<f64>,
    pub hourly_distribution: BTreeMap<u32, usize>,
    pub potential_issues: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StationReport {
    pub station_id: String,
    pub user_count: usize,
    pub users: Vec<StationUserReport>,
}

#[derive(Debug, Serialize)]
pub struct RealmUsageReport {
    pub realm: String,
    pub station_count: usize,
    pub stations: Vec<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SpReport {
    pub query_info: QueryInfo,
    pub description: String,
    pub summary: SpSummary,
    pub stations: Vec<StationReport>,
    pub realms: Vec<RealmUsageReport>,
}

impl SpActivity {
    /// Materialise the sorted report: stations by descending user count,
    /// the users of each station by ascending username; realms by
    /// descending station count.
    pub fn into_report(self, query_info: QueryInfo) -> SpReport {
        let mut all_users: BTreeSet<&str> = BTreeSet::new();
        for stats in self.stations.values() {
            all_users.extend(stats.users.keys().map(String::as_str));
        }
        let unique_users = all_users.len();

        let stations = self
            .stations
            .into_iter()
            .map(|(station_id, stats)| {
                let users = stats
                    .users
                    .into_iter()
                    .filter(|(_, activity)| !activity.timestamps.is_empty())
                    .map(|(username, activity)| station_user_report(username, activity))
                    .collect_vec();
                StationReport {
                    station_id,
                    user_count: users.len(),
                    users,
                }
            })
            .sorted_by(|a, b| {
                b.user_count
                    .cmp(&a.user_count)
                    .then_with(|| a.station_id.cmp(&b.station_id))
            })
            .collect_vec();
        let realms = self
            .realms
            .into_iter()
            .map(|(realm, stats)| RealmUsageReport {
                realm,
                station_count: stats.stations.len(),
                stations: stats.stations.into_iter().collect(),
                users: stats.users.into_iter().collect(),
            })
            .sorted_by(|a, b| {
                b.station_count
                    .cmp(&a.station_count)
                    .then_with(|| a.realm.cmp(&b.realm))
            })
            .collect_vec();
        let description = format!(
            "Stations seen at {} with accepted authentications between {} and {}",
            query_info.target, query_info.start_date, query_info.end_date
        );
        SpReport {
            summary: SpSummary {
                unique_stations: stations.len(),
                unique_users,
                unique_realms: realms.len(),
            },
            description,
            query_info,
            stations,
            realms,
        }
    }
}

fn station_user_report(username: String, activity: UserActivity) -> StationUserReport {
    let timestamps: Vec<DateTime<Utc>> = activity.timestamps.into_iter().collect();
    StationUserReport {
        username,
        realm: activity.realm,
        auth_count: timestamps.len(),
        first_seen: *timestamps.first().expect("activity without timestamps"),
        last_seen: *timestamps.last().expect("activity without timestamps"),
        sessions: patterns::sessions(&timestamps),
        active_periods: patterns::active_periods(&timestamps),
        frequent_reauths: patterns::frequent_reauths(&timestamps),
        longest_gap_minutes: patterns::longest_gap(&timestamps)
            .map(|gap| gap.num_seconds() as f64 / 60.0),
        hourly_distribution: patterns::hourly_distribution(&timestamps),
        potential_issues: patterns::potential_issues(&timestamps),
    }
}
