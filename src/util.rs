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
//! Utility module collection of functions

pub fn init_logging() {
    pretty_env_logger::init();
}

/// Resolve the realm argument of the realm-side tool to a fully qualified
/// federation domain. The two European top-level relays are special-cased.
pub fn resolve_realm_domain(domain: &str) -> String {
    match domain {
        "etlr1" => "etlr1.eduroam.org".to_string(),
        "etlr2" => "etlr2.eduroam.org".to_string(),
        other => format!("eduroam.{other}"),
    }
}

/// Resolve the service-provider argument. Already-qualified `eduroam.` names
/// pass through unchanged.
pub fn resolve_sp_domain(sp: &str) -> String {
    match sp {
        "etlr1" => "etlr1.eduroam.org".to_string(),
        "etlr2" => "etlr2.eduroam.org".to_string(),
        other if other.starts_with("eduroam.") => other.to_string(),
        other => format!("eduroam.{other}"),
    }
}
