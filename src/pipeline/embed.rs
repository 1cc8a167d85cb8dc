use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::db::models::{encode_vector, Project, Segment};
use crate::db::Database;
use crate::pipeline::{complete_stage_run, start_stage_run, StageError, StageReport};

/// One detected speaker within a segment: a voice embedding plus the time
/// ranges where that speaker is attributed as talking.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerTrack {
    pub speaker: String,
    pub embedding: Vec<f32>,
    pub turns: Vec<SpeechTurn>,
}

/// Seconds within the parent segment.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpeechTurn {
    pub start: f64,
    pub end: f64,
}

/// Diarization collaborator: one blocking call per segment. The model,
/// its runtime, and its credentials all live on the other side of this
/// trait.
pub trait Diarizer {
    fn diarize(&self, audio: &Path) -> Result<Vec<SpeakerTrack>>;
}

#[derive(Debug, Deserialize)]
struct DiarizeResponse {
    tracks: Vec<SpeakerTrack>,
}

/// Talks to a diarization HTTP service: POST the WAV, get speaker tracks.
pub struct HttpDiarizer {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpDiarizer {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Diarizer for HttpDiarizer {
    fn diarize(&self, audio: &Path) -> Result<Vec<SpeakerTrack>> {
        let bytes = std::fs::read(audio)
            .with_context(|| format!("Failed to read {}", audio.display()))?;

        let url = format!("{}/v1/diarize", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(bytes)
            .send()
            .context("Failed to send request to diarization service")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            bail!("Diarization service returned {status}: {text}");
        }

        let parsed: DiarizeResponse = resp
            .json()
            .context("Failed to parse diarization response")?;
        Ok(parsed.tracks)
    }
}

/// Extract and persist embeddings for every segment in the project that
/// doesn't have them yet.
pub fn embed_all(
    db: &Database,
    project: &Project,
    diarizer: &dyn Diarizer,
    min_interval_secs: f64,
) -> Result<StageReport> {
    let start = Instant::now();
    let mut report = StageReport::new("embed");
    let run_id = start_stage_run(&db.conn, report.stage)?;

    let segments = db.list_segments_for_project(project.project_id)?;
    if segments.is_empty() {
        info!(
            "No segments found for project '{}'; run segment first",
            project.project_name
        );
    }

    for segment in &segments {
        if db.has_embeddings(segment.segment_id)? {
            info!("Embeddings already exist for '{}'", segment.file_path);
            report.record_skipped();
            continue;
        }

        match embed_segment(db, segment, diarizer, min_interval_secs) {
            Ok(kept) => {
                info!(
                    "Stored {kept} speaker embeddings for '{}'",
                    segment.file_path
                );
                report.record_processed();
            }
            Err(e) => {
                warn!("Embedding failed for '{}': {e}", segment.file_path);
                report.record_failure(&segment.file_path, &e);
            }
        }
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    complete_stage_run(&db.conn, run_id, &report)?;
    Ok(report)
}

/// Diarize one segment and persist its speakers. Everything for the
/// segment lands in one transaction: an embedding is never left behind
/// without at least one speech interval, and a failed segment leaves no
/// partial state (so the guard retries it on the next run).
fn embed_segment(
    db: &Database,
    segment: &Segment,
    diarizer: &dyn Diarizer,
    min_interval_secs: f64,
) -> Result<usize, StageError> {
    let path = Path::new(&segment.file_path);
    if !path.is_file() {
        return Err(StageError::MissingInput(format!(
            "segment audio not found: {}",
            segment.file_path
        )));
    }

    let tracks = diarizer
        .diarize(path)
        .map_err(|e| StageError::Collaborator(e.to_string()))?;

    let tx = db.conn.unchecked_transaction()?;
    let mut kept = 0usize;

    for track in &tracks {
        if track.embedding.is_empty() {
            warn!(
                "Diarizer returned an empty embedding for speaker '{}' in '{}'; dropping it",
                track.speaker, segment.file_path
            );
            continue;
        }

        tx.execute(
            "INSERT INTO embeddings (segment_id, vector) VALUES (?1, ?2)",
            rusqlite::params![segment.segment_id, encode_vector(&track.embedding)],
        )?;
        let embedding_id = tx.last_insert_rowid();

        let mut valid_intervals = 0usize;
        for turn in &track.turns {
            let duration = turn.end - turn.start;
            if duration >= min_interval_secs {
                tx.execute(
                    "INSERT INTO speech_intervals (embedding_id, start_seconds, end_seconds)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![embedding_id, turn.start, turn.end],
                )?;
                valid_intervals += 1;
            } else {
                debug!(
                    "Skipped short interval {:.1}s..{:.1}s ({duration:.2}s) for speaker '{}'",
                    turn.start, turn.end, track.speaker
                );
            }
        }

        if valid_intervals == 0 {
            // every detection was below the minimum duration
            tx.execute("DELETE FROM embeddings WHERE embedding_id = ?1", [embedding_id])?;
            debug!(
                "No intervals of at least {min_interval_secs}s for speaker '{}'; embedding discarded",
                track.speaker
            );
        } else {
            kept += 1;
        }
    }

    tx.commit()?;
    Ok(kept)
}
