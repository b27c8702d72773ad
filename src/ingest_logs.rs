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
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use roamtrace::config::IngestConfig;
use roamtrace::ingest::{self, metrics::MetricsPoller, IngestClient};
use roamtrace::util;

/// Tail the federation relay log and ship every parsed entry to the
/// indexing service.
#[derive(Parser)]
#[command(name = "ingest_logs")]
struct Args {
    /// Properties file with connection settings and credentials
    #[arg(long, default_value = "config.properties")]
    config: PathBuf,
    /// Override the tailed log file
    #[arg(long)]
    logfile: Option<PathBuf>,
    /// Override the base URL of the indexing service
    #[arg(long)]
    quickwit_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    util::init_logging();
    let args = Args::parse();

    let mut config = IngestConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(logfile) = args.logfile {
        config.log_file_path = logfile;
    }
    if let Some(url) = args.quickwit_url {
        config.quickwit_url = url;
    }
    log::info!(
        "ingesting {} into {} (index {:?}, batches of {})",
        config.log_file_path.display(),
        config.quickwit_url,
        config.index,
        config.batch_size
    );

    let poller = MetricsPoller::new(
        &config.quickwit_url,
        config.index.clone(),
        MetricsPoller::DEFAULT_INTERVAL,
    );
    tokio::spawn(poller.run());

    let client = IngestClient::new(
        &config.quickwit_url,
        &config.index,
        config.username.clone(),
        config.password.clone(),
        config.max_retries,
    )?;
    ingest::run(&config.log_file_path, config.batch_size, client).await?;
    Ok(())
}
