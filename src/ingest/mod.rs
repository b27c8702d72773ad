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
//! The ingestion pipeline: a one-shot catch-up over the existing file
//! contents, then an indefinite change-driven tail. Lines are parsed,
//! batched and handed to the ingest client on this single loop; only the
//! statistics poller runs beside it.
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::parser;
use crate::records::LogEntry;

pub mod client;
pub mod metrics;

pub use client::{IngestClient, IngestError};

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file watch: {0}")]
    Watch(#[from] notify::Error),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Tails one log file and feeds parsed entries to the ingest client in
/// batches of at most `batch_size`, preserving file order. The file is
/// opened once and re-read from the stored offset on every change event.
pub struct LogTailer {
    path: PathBuf,
    batch_size: usize,
    client: IngestClient,
    reader: BufReader<File>,
    offset: u64,
    buffer: Vec<LogEntry>,
    parsed: u64,
    skipped: u64,
}

impl LogTailer {
    pub async fn open(
        path: impl Into<PathBuf>,
        batch_size: usize,
        client: IngestClient,
    ) -> Result<Self, TailError> {
        let path = path.into();
        let file = File::open(&path).await.map_err(|source| TailError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(LogTailer {
            path,
            batch_size: batch_size.max(1),
            client,
            reader: BufReader::new(file),
            offset: 0,
            buffer: Vec::new(),
            parsed: 0,
            skipped: 0,
        })
    }

    fn io_error(&self, source: std::io::Error) -> TailError {
        TailError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Catch-up phase: read the whole existing file, flushing full batches
    /// along the way and the residual partial batch at the end.
    pub async fn catch_up(&mut self) -> Result<(), TailError> {
        self.drain_to_eof().await?;
        self.flush().await?;
        log::info!(
            "catch-up complete at offset {}: {} entries ingested, {} lines skipped",
            self.offset,
            self.parsed,
            self.skipped
        );
        Ok(())
    }

    /// Tail phase: re-drain the file on every change event, indefinitely.
    /// Watcher errors are logged and the loop continues; the loop ends
    /// cleanly when the watch channel closes.
    pub async fn tail(&mut self) -> Result<(), TailError> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Result<notify::Event, notify::Error>>(256);
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = tx.blocking_send(event);
        })?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        log::info!("tailing {}", self.path.display());

        while let Some(event) = rx.recv().await {
            match event {
                Ok(event) if is_write_event(&event.kind) => {
                    self.drain_to_eof().await?;
                    self.flush().await?;
                }
                Ok(_) => {}
                Err(error) => log::warn!("watcher error: {error}"),
            }
        }
        log::info!("watch channel closed, stopping tail loop");
        Ok(())
    }

    /// Read from the stored offset to end-of-file. Only complete,
    /// newline-terminated lines are consumed; a half-written tail line stays
    /// unconsumed until the writer finishes it.
    async fn drain_to_eof(&mut self) -> Result<(), TailError> {
        let seek_to = std::io::SeekFrom::Start(self.offset);
        self.reader
            .seek(seek_to)
            .await
            .map_err(|e| self.io_error(e))?;
        let mut line = String::new();
        loop {
            line.clear();
            let n = match self.reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(source) => return Err(self.io_error(source)),
            };
            if n == 0 || !line.ends_with('\n') {
                break;
            }
            self.offset += n as u64;
            let text = line.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            match parser::parse_line(text) {
                Ok(entry) => {
                    self.parsed += 1;
                    self.buffer.push(entry);
                    if self.buffer.len() >= self.batch_size {
                        self.flush().await?;
                    }
                }
                Err(error) => {
                    self.skipped += 1;
                    log::warn!("skipping line: {error}");
                }
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TailError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.client.send_batch(&batch).await?;
        log::debug!("delivered batch of {} entries", batch.len());
        Ok(())
    }
}

fn is_write_event(kind: &notify::EventKind) -> bool {
    use notify::EventKind;
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

/// Run the whole ingestion pipeline on `path`: catch-up, then tail until the
/// watcher goes away.
pub async fn run(path: &Path, batch_size: usize, client: IngestClient) -> Result<(), TailError> {
    let mut tailer = LogTailer::open(path, batch_size, client).await?;
    tailer.catch_up().await?;
    tailer.tail().await
}
