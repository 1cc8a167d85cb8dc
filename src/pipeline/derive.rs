use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::audio;
use crate::db::models::{IntervalSlice, Project};
use crate::db::Database;
use crate::pipeline::{complete_stage_run, start_stage_run, StageError, StageReport};

/// Name of the project-level directory that holds per-interval artifacts.
pub const FINAL_SEGMENTS_DIR: &str = "FinalSegments";

/// Materialize one standalone audio artifact per speech interval in the
/// store. Output names are keyed by interval id, which makes the stage
/// guard's existence check exact and reruns collision-free.
pub fn derive_all(db: &Database, project: &Project) -> Result<StageReport> {
    let start = Instant::now();
    let mut report = StageReport::new("derive");
    let run_id = start_stage_run(&db.conn, report.stage)?;

    let slices = db.list_interval_slices()?;
    if slices.is_empty() {
        info!("No speech intervals found in the store; run embed first");
    }

    let final_dir = Path::new(&project.root_path).join(FINAL_SEGMENTS_DIR);

    for slice in &slices {
        if db.has_derived_segment(slice.interval_id)? {
            report.record_skipped();
            continue;
        }

        match derive_one(db, slice, &final_dir) {
            Ok(path) => {
                info!("Derived segment saved as {path}");
                report.record_processed();
            }
            Err(e) => {
                // partial completion is expected; the guard retries only
                // the missing intervals on the next run
                warn!("Derivation failed for interval {}: {e}", slice.interval_id);
                report.record_failure(&format!("interval {}", slice.interval_id), &e);
            }
        }
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    complete_stage_run(&db.conn, run_id, &report)?;
    Ok(report)
}

fn derive_one(
    db: &Database,
    slice: &IntervalSlice,
    final_dir: &Path,
) -> Result<String, StageError> {
    let input = Path::new(&slice.segment_path);
    if !input.is_file() {
        return Err(StageError::MissingInput(format!(
            "parent segment audio not found: {}",
            slice.segment_path
        )));
    }

    let output = final_dir.join(format!("segment_{}.wav", slice.interval_id));
    let start_ms = (slice.start_seconds * 1000.0) as u64;
    let end_ms = (slice.end_seconds * 1000.0) as u64;

    audio::slice_wav(input, start_ms, end_ms, &output)
        .map_err(|e| StageError::Audio(e.to_string()))?;

    let label_id = db
        .first_label_for_embedding(slice.embedding_id)
        .map_err(StageError::store)?;
    db.insert_derived_segment(slice.interval_id, label_id, &output.to_string_lossy())
        .map_err(StageError::store)?;

    Ok(output.to_string_lossy().into_owned())
}
