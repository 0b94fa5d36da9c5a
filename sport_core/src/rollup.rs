//! CSV history rollup of queued set requests.
//!
//! Moves every queued `CreateSet` request from the outbox into an
//! append-only CSV history and archives it as JSONL next to the outbox.
//! Everything else stays queued. The CSV is synced before the outbox is
//! rewritten, so a crash never loses a set. The outbox lock is held
//! throughout, so a concurrent append is never dropped.

use crate::outbox::{read_requests, write_requests, ApiRequest, PendingRequest};
use crate::store::with_lock;
use crate::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// A row in the CSV history
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    request_id: String,
    training_id: i64,
    exercise_id: i64,
    reps: u32,
    weight_kg: Option<f64>,
    rest_seconds: Option<u32>,
    notes: Option<String>,
    queued_at: String,
}

/// Roll queued sets into `csv_path` and archive them
///
/// Returns the number of set rows written. Requests other than `CreateSet`
/// (such as `CompleteTraining`) are left in the outbox.
pub fn outbox_to_csv_and_archive(outbox_path: &Path, csv_path: &Path) -> Result<usize> {
    with_lock(outbox_path, || {
        let (sets, kept): (Vec<PendingRequest>, Vec<PendingRequest>) = read_requests(outbox_path)?
            .into_iter()
            .partition(|pending| matches!(pending.request, ApiRequest::CreateSet(_)));

        if sets.is_empty() {
            tracing::info!("No queued sets to roll up");
            return Ok(0);
        }

        let written = append_csv(csv_path, &sets)?;
        tracing::info!("Wrote {} sets to CSV history", written);

        let processed_path = outbox_path.with_extension("jsonl.processed");
        append_archive(&processed_path, &sets)?;
        tracing::info!("Archived {} requests to {:?}", sets.len(), processed_path);

        if kept.is_empty() {
            std::fs::remove_file(outbox_path)?;
        } else {
            write_requests(outbox_path, &kept)?;
            tracing::debug!("{} requests remain queued", kept.len());
        }

        Ok(written)
    })
}

fn append_csv(csv_path: &Path, sets: &[PendingRequest]) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Only a brand-new file gets a header row
    let needs_headers = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    let mut written = 0;
    for pending in sets {
        if let ApiRequest::CreateSet(set) = &pending.request {
            writer.serialize(CsvRow {
                request_id: pending.id.to_string(),
                training_id: pending.training_id,
                exercise_id: set.exercise_id,
                reps: set.reps,
                weight_kg: set.weight_kg,
                rest_seconds: set.rest_seconds,
                notes: set.notes.clone(),
                queued_at: pending.queued_at.to_rfc3339(),
            })?;
            written += 1;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    Ok(written)
}

fn append_archive(path: &Path, requests: &[PendingRequest]) -> Result<()> {
    let mut contents = Vec::new();
    for request in requests {
        serde_json::to_writer(&mut contents, request)?;
        contents.push(b'\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&contents)?;
    file.sync_all()?;
    Ok(())
}

/// Remove archived outbox files from `dir`
pub fn cleanup_processed(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "processed") {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed archived outbox {:?}", path);
            count += 1;
        }
    }

    Ok(count)
}
