use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::db::Database;
use crate::pipeline::{complete_stage_run, start_stage_run, StageError, StageReport};

/// Transcription collaborator: audio file in, text out.
pub trait Transcriber {
    fn transcribe(&self, audio: &Path) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Talks to a transcription HTTP service: POST the WAV, get text back.
pub struct HttpTranscriber {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpTranscriber {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, audio: &Path) -> Result<String> {
        let bytes = std::fs::read(audio)
            .with_context(|| format!("Failed to read {}", audio.display()))?;

        let url = format!("{}/v1/transcribe", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(bytes)
            .send()
            .context("Failed to send request to transcription service")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            bail!("Transcription service returned {status}: {text}");
        }

        let parsed: TranscribeResponse = resp
            .json()
            .context("Failed to parse transcription response")?;
        Ok(parsed.text.trim().to_string())
    }
}

/// Transcribe every derived segment without a transcript yet, keyed by the
/// owning speech interval.
pub fn transcribe_all(db: &Database, transcriber: &dyn Transcriber) -> Result<StageReport> {
    let start = Instant::now();
    let mut report = StageReport::new("transcribe");
    let run_id = start_stage_run(&db.conn, report.stage)?;

    let derived = db.list_derived_segments()?;
    if derived.is_empty() {
        info!("No derived segments found in the store; run derive first");
    }

    for d in &derived {
        if db.has_transcript(d.interval_id)? {
            report.record_skipped();
            continue;
        }

        match transcribe_one(db, d.interval_id, &d.file_path, transcriber) {
            Ok(()) => report.record_processed(),
            Err(e) => {
                warn!("Transcription failed for '{}': {e}", d.file_path);
                report.record_failure(&d.file_path, &e);
            }
        }
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    complete_stage_run(&db.conn, run_id, &report)?;
    Ok(report)
}

/// Degraded path for stores materialized by older versions: scan a
/// FinalSegments directory and recover each interval id from the
/// `segment_{interval_id}.wav` file name.
pub fn transcribe_directory(
    db: &Database,
    dir: &Path,
    transcriber: &dyn Transcriber,
) -> Result<StageReport> {
    if !dir.is_dir() {
        bail!("FinalSegments directory not found: {}", dir.display());
    }

    let start = Instant::now();
    let mut report = StageReport::new("transcribe");
    let run_id = start_stage_run(&db.conn, report.stage)?;

    // Match: segment_{interval_id}.wav
    let name_re = regex::Regex::new(r"^segment_(\d+)\.wav$").unwrap();

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = name_re.captures(name) else {
            if name.ends_with(".wav") {
                info!("File '{name}' does not match the expected name format; skipping");
            }
            continue;
        };
        let Ok(interval_id) = caps[1].parse::<i64>() else {
            info!("File '{name}' has an out-of-range interval id; skipping");
            continue;
        };

        if db.has_transcript(interval_id)? {
            report.record_skipped();
            continue;
        }

        match transcribe_one(db, interval_id, &path.to_string_lossy(), transcriber) {
            Ok(()) => report.record_processed(),
            Err(e) => {
                warn!("Transcription failed for '{name}': {e}");
                report.record_failure(name, &e);
            }
        }
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    complete_stage_run(&db.conn, run_id, &report)?;
    Ok(report)
}

fn transcribe_one(
    db: &Database,
    interval_id: i64,
    file_path: &str,
    transcriber: &dyn Transcriber,
) -> Result<(), StageError> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(StageError::MissingInput(format!(
            "derived audio not found: {file_path}"
        )));
    }

    let text = transcriber
        .transcribe(path)
        .map_err(|e| StageError::Collaborator(e.to_string()))?;

    db.insert_transcript(interval_id, &text)
        .map_err(StageError::store)?;
    info!("Transcript stored for interval {interval_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FakeTranscriber;
    impl Transcriber for FakeTranscriber {
        fn transcribe(&self, audio: &Path) -> Result<String> {
            Ok(format!("words from {}", audio.file_name().unwrap().to_string_lossy()))
        }
    }

    struct ExplodingTranscriber;
    impl Transcriber for ExplodingTranscriber {
        fn transcribe(&self, _audio: &Path) -> Result<String> {
            bail!("service unavailable")
        }
    }

    fn seeded_with_derived(dir: &tempfile::TempDir) -> Database {
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        let project = db.create_or_get_project("p", dir.path()).unwrap();
        let src = db
            .insert_source(project.project_id, "x", "", "", None)
            .unwrap();
        let audio_id = db
            .insert_audio_file(project.project_id, src, "a.wav", "/tmp", "/tmp/a.wav", Some(30.0))
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO segments (audio_id, start_seconds, end_seconds, duration_seconds, file_path)
                 VALUES (?1, 0, 30, 30, '/tmp/seg.wav')",
                [audio_id],
            )
            .unwrap();
        let seg_id = db.conn.last_insert_rowid();
        db.conn
            .execute(
                "INSERT INTO embeddings (segment_id, vector) VALUES (?1, ?2)",
                rusqlite::params![seg_id, crate::db::models::encode_vector(&[0.1])],
            )
            .unwrap();
        let emb_id = db.conn.last_insert_rowid();
        db.conn
            .execute(
                "INSERT INTO speech_intervals (embedding_id, start_seconds, end_seconds)
                 VALUES (?1, 1.0, 4.0)",
                [emb_id],
            )
            .unwrap();
        let interval_id = db.conn.last_insert_rowid();

        let wav = dir.path().join(format!("segment_{interval_id}.wav"));
        crate::audio::write_ramp_wav(&wav, 1000, 3000);
        db.insert_derived_segment(interval_id, None, &wav.to_string_lossy())
            .unwrap();
        db
    }

    #[test]
    fn transcribes_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = seeded_with_derived(&dir);

        let first = transcribe_all(&db, &FakeTranscriber).unwrap();
        assert_eq!(first.processed, 1);

        let second = transcribe_all(&db, &FakeTranscriber).unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(db.stats().unwrap().transcripts, 1);
    }

    #[test]
    fn collaborator_failure_skips_and_continues() {
        let dir = tempdir().unwrap();
        let db = seeded_with_derived(&dir);

        let report = transcribe_all(&db, &ExplodingTranscriber).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(db.stats().unwrap().transcripts, 0);

        // retryable on the next run
        let retry = transcribe_all(&db, &FakeTranscriber).unwrap();
        assert_eq!(retry.processed, 1);
    }

    #[test]
    fn directory_scan_parses_interval_ids() {
        let dir = tempdir().unwrap();
        let db = seeded_with_derived(&dir);
        // a stray file that doesn't match the naming scheme
        std::fs::write(dir.path().join("notes.wav"), b"not audio").unwrap();

        let report = transcribe_directory(&db, dir.path(), &FakeTranscriber).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(db.stats().unwrap().transcripts, 1);
    }
}
