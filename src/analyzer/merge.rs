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
//! Merging the synthetic entry stream into the aggregation state. The
//! merger owns its state while the stream is open; the workers are
//! stateless producers. Cross-maps are filled pairwise in the same pass, so
//! their consistency is structural rather than assembled after the fact.
use crate::records::LogEntry;

use super::result::{RealmActivity, SpActivity, UserActivity};

/// Aggregation state fed from the entry channel by the merger task.
pub trait Aggregate: Default + Send + 'static {
    type Output: Send + 'static;

    fn absorb(&mut self, entry: LogEntry);

    /// Materialise the final state. Called exactly once, after the entry
    /// stream has closed.
    fn finish(self) -> Self::Output;
}

/// Accept-by-realm merge: per-user day sets and the user/provider
/// cross-maps.
#[derive(Debug, Default)]
pub struct RealmMerger {
    activity: RealmActivity,
}

impl Aggregate for RealmMerger {
    type Output = RealmActivity;

    fn absorb(&mut self, entry: LogEntry) {
        let Some(username) = entry.username else {
            return;
        };
        let user = self.activity.users.entry(username.clone()).or_default();
        user.days.insert(entry.timestamp.date_naive());
        if let Some(provider) = entry.service_provider {
            user.providers.insert(provider.clone());
            self.activity
                .providers
                .entry(provider)
                .or_default()
                .users
                .insert(username);
        }
    }

    fn finish(self) -> RealmActivity {
        self.activity
    }
}

/// Accept-by-SP merge: per-station per-user timestamp lists and the
/// station/realm cross-maps.
#[derive(Debug, Default)]
pub struct SpMerger {
    activity: SpActivity,
}

impl Aggregate for SpMerger {
    type Output = SpActivity;

    fn absorb(&mut self, entry: LogEntry) {
        let (Some(station_id), Some(username)) = (entry.station_id, entry.username) else {
            return;
        };
        let station = self.activity.stations.entry(station_id.clone()).or_default();
        let activity = station
            .users
            .entry(username.clone())
            .or_insert_with(|| UserActivity {
                realm: entry.realm.clone(),
                timestamps: Default::default(),
            });
        activity.timestamps.insert(entry.timestamp);
        if activity.realm.is_none() {
            activity.realm = entry.realm.clone();
        }
        if let Some(realm) = entry.realm {
            let stats = self.activity.realms.entry(realm).or_default();
            stats.stations.insert(station_id);
            stats.users.insert(username);
        }
    }

    fn finish(self) -> SpActivity {
        self.activity
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::records::MessageKind;
    use chrono::{TimeZone, Utc};

    fn entry(day: u32, username: &str, provider: Option<&str>) -> LogEntry {
        let ts = Utc.with_ymd_and_hms(2024, 10, day, 0, 0, 0).unwrap();
        let mut e = LogEntry::new(ts, "");
        e.message_kind = MessageKind::AccessAccept;
        e.username = Some(username.to_string());
        e.service_provider = provider.map(str::to_string);
        e
    }

    #[test]
    fn realm_merge_counts_distinct_days() {
        let mut merger = RealmMerger::default();
        for day in [14, 14, 15, 16] {
            merger.absorb(entry(day, "alice@x", Some("sp1")));
        }
        merger.absorb(entry(14, "bob@x", Some("sp1")));
        merger.absorb(entry(14, "bob@x", Some("sp2")));
        let activity = merger.finish();

        assert_eq!(activity.users["alice@x"].days.len(), 3);
        assert_eq!(
            activity.users["bob@x"].providers,
            ["sp1".to_string(), "sp2".to_string()].into_iter().collect()
        );
        assert_eq!(activity.providers["sp1"].users.len(), 2);
        assert_eq!(activity.providers["sp2"].users.len(), 1);
        // cross-map consistency: every listed user is a key in `users`
        for stats in activity.providers.values() {
            for user in &stats.users {
                assert!(activity.users.contains_key(user));
            }
        }
    }

    #[test]
    fn realm_merge_ignores_userless_entries() {
        let mut merger = RealmMerger::default();
        let mut e = entry(14, "x", None);
        e.username = None;
        merger.absorb(e);
        assert!(merger.finish().users.is_empty());
    }

    #[test]
    fn sp_merge_builds_station_and_realm_maps() {
        let ts = |m: u32| Utc.with_ymd_and_hms(2024, 10, 14, 9, m, 0).unwrap();
        let mk = |m: u32, user: &str, realm: &str| {
            let mut e = LogEntry::new(ts(m), "");
            e.message_kind = MessageKind::AccessAccept;
            e.station_id = Some("S1".to_string());
            e.username = Some(user.to_string());
            e.realm = Some(realm.to_string());
            e
        };
        let mut merger = SpMerger::default();
        merger.absorb(mk(0, "alice@r1", "r1"));
        merger.absorb(mk(1, "alice@r1", "r1"));
        merger.absorb(mk(1, "alice@r1", "r1")); // duplicate timestamp collapses
        merger.absorb(mk(0, "bob@r2", "r2"));
        let activity = merger.finish();

        let station = &activity.stations["S1"];
        assert_eq!(station.users.len(), 2);
        assert_eq!(station.users["alice@r1"].timestamps.len(), 2);
        assert_eq!(station.users["alice@r1"].realm.as_deref(), Some("r1"));
        assert_eq!(activity.realms.len(), 2);
        assert_eq!(
            activity.realms["r1"].stations,
            ["S1".to_string()].into_iter().collect()
        );
        // cross-map consistency: every station listed under a realm exists
        for stats in activity.realms.values() {
            for station in &stats.stations {
                assert!(activity.stations.contains_key(station));
            }
        }
    }
}
