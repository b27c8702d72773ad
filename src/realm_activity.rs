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
use std::path::Path;

use anyhow::Context;
use chrono::{Local, Utc};
use clap::Parser;

use roamtrace::analyzer::{jobs::shard_days, jobs::Window, result::QueryInfo, run_realm_query};
use roamtrace::analyzer::search::{realm_query, SearchClient};
use roamtrace::config::QueryConfig;
use roamtrace::{report, util};

/// Report which users of a realm were active, on which days, and through
/// which service providers.
#[derive(Parser)]
#[command(name = "realm_activity")]
struct Args {
    /// Realm domain (e.g. `ku.ac.th`), or the literal `etlr1` / `etlr2`
    domain: String,
    /// Reporting window: a day count in [1, 366] or a single DD-MM-YYYY date
    #[arg(default_value = "7")]
    window: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    util::init_logging();
    let args = Args::parse();

    let window = Window::parse_realm(&args.window)
        .context("usage: realm_activity <domain> [days | DD-MM-YYYY]")?;
    let domain = util::resolve_realm_domain(&args.domain);
    let config = QueryConfig::load(Path::new(QueryConfig::DEFAULT_PATH))
        .context("reading qw-auth.properties")?;

    let (start_date, end_date) = window.resolve(Local::now().date_naive());
    let job_list = shard_days(start_date, end_date);
    let query = realm_query(&domain);
    log::debug!("{query} over {} days", job_list.len());

    let client = SearchClient::new(
        &config.base_url,
        &config.index,
        config.username.clone(),
        config.password.clone(),
    )?;
    let outcome = run_realm_query(client, query.clone(), job_list).await?;

    let query_info = QueryInfo {
        target: domain.clone(),
        query,
        start_date,
        end_date,
        days: outcome.days,
        total_hits: outcome.total_hits,
        generated_at: Utc::now(),
    };
    let report_doc = outcome.output.into_report(query_info);
    let path = report::output_path(&domain, &window.label(), None);
    report::write_report(&path, &report_doc)?;

    println!(
        "{}: {} users, {} providers, {} hits over {} days",
        domain,
        report_doc.summary.total_users,
        report_doc.summary.total_providers,
        outcome.total_hits,
        outcome.days
    );
    println!("remote query:     {:.2?}", outcome.remote_elapsed);
    println!("local processing: {:.2?}", outcome.merge_elapsed);
    println!("overall:          {:.2?}", outcome.overall_elapsed);
    println!("report written to {}", path.display());
    Ok(())
}
