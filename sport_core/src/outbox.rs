//! Outbox of remote API requests waiting to be sent.
//!
//! Requests are appended to a JSONL (JSON Lines) file. Appends and rewrites
//! (removal, retry bookkeeping, rollup) all take the outbox's `.lock` file,
//! so a rewrite never drops a request appended by another process.

use crate::store::{with_lock, write_atomic};
use crate::{CompleteTrainingRequest, CreateSetRequest, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A mutation of the training API
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiRequest {
    CreateSet(CreateSetRequest),
    CompleteTraining(CompleteTrainingRequest),
}

/// A queued request plus its delivery bookkeeping
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingRequest {
    pub id: Uuid,
    pub training_id: i64,
    pub request: ApiRequest,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl PendingRequest {
    pub fn new(training_id: i64, request: ApiRequest, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            training_id,
            request,
            queued_at: now,
            retry_count: 0,
            max_retries,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Destination for requests that could not be sent yet
pub trait RequestSink {
    fn append(&mut self, request: &PendingRequest) -> Result<()>;
}

/// JSONL-backed outbox with file locking
pub struct JsonlOutbox {
    path: PathBuf,
}

impl JsonlOutbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All queued requests, oldest first
    pub fn read_pending(&self) -> Result<Vec<PendingRequest>> {
        read_requests(&self.path)
    }

    /// Drop a request once the server has accepted it
    pub fn remove(&mut self, id: Uuid) -> Result<bool> {
        self.rewrite(|pending| {
            let before = pending.len();
            pending.retain(|r| r.id != id);
            pending.len() != before
        })
    }

    /// Count a failed delivery attempt
    pub fn record_failure(&mut self, id: Uuid) -> Result<bool> {
        self.rewrite(|pending| match pending.iter_mut().find(|r| r.id == id) {
            Some(request) => {
                request.retry_count += 1;
                true
            }
            None => false,
        })
    }

    /// Discard requests that used up their retries; returns how many
    pub fn drop_exhausted(&mut self) -> Result<usize> {
        let mut dropped = 0;
        self.rewrite(|pending| {
            let before = pending.len();
            pending.retain(|r| !r.is_exhausted());
            dropped = before - pending.len();
            dropped > 0
        })?;
        if dropped > 0 {
            tracing::warn!("Dropped {} requests after too many failed attempts", dropped);
        }
        Ok(dropped)
    }

    /// Apply `f` to the queue and write it back if it reports a change
    fn rewrite<F>(&mut self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<PendingRequest>) -> bool,
    {
        with_lock(&self.path, || {
            let mut pending = read_requests(&self.path)?;
            if !f(&mut pending) {
                return Ok(false);
            }
            write_requests(&self.path, &pending)?;
            Ok(true)
        })
    }
}

/// Replace the outbox at `path` with `requests`
///
/// Callers must hold the outbox lock.
pub(crate) fn write_requests(path: &Path, requests: &[PendingRequest]) -> Result<()> {
    let mut contents = Vec::new();
    for request in requests {
        serde_json::to_writer(&mut contents, request)?;
        contents.push(b'\n');
    }
    write_atomic(path, &contents)
}

impl RequestSink for JsonlOutbox {
    fn append(&mut self, request: &PendingRequest) -> Result<()> {
        let line = serde_json::to_string(request)?;

        with_lock(&self.path, || {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;

            let mut writer = std::io::BufWriter::new(&file);
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            Ok(())
        })?;

        tracing::debug!(
            "Queued request {} for training {}",
            request.id,
            request.training_id
        );
        Ok(())
    }
}

/// Read every parsable request from an outbox file
pub fn read_requests(path: &Path) -> Result<Vec<PendingRequest>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut requests = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<PendingRequest>(&line) {
            Ok(request) => requests.push(request),
            Err(e) => {
                tracing::warn!("Failed to parse request at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} pending requests", requests.len());
    Ok(requests)
}
