use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::audio;
use crate::db::models::{AudioFile, Project};
use crate::db::Database;
use crate::pipeline::{complete_stage_run, start_stage_run, StageError, StageReport};

/// Split every audio artifact in the project into fixed-length segments.
/// Artifacts that already have segments are skipped by the stage guard.
pub fn segment_all(
    db: &Database,
    project: &Project,
    segment_length_secs: f64,
) -> Result<StageReport> {
    let start = Instant::now();
    let mut report = StageReport::new("segment");
    let run_id = start_stage_run(&db.conn, report.stage)?;

    let audio_files = db.list_audio_files(project.project_id)?;
    if audio_files.is_empty() {
        info!(
            "No audio files found for project '{}'; run fetch first",
            project.project_name
        );
    }

    let segment_length_ms = (segment_length_secs * 1000.0).round() as u64;
    for audio_file in &audio_files {
        if db.has_segments(audio_file.audio_id)? {
            info!("Segments already exist for '{}'", audio_file.file_path);
            report.record_skipped();
            continue;
        }

        match split_audio_file(db, audio_file, segment_length_ms) {
            Ok(count) => {
                info!(
                    "Split '{}' into {count} segments",
                    audio_file.file_path
                );
                report.record_processed();
            }
            Err(e) => {
                warn!("Segmentation failed for '{}': {e}", audio_file.file_path);
                report.record_failure(&audio_file.file_path, &e);
            }
        }
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    complete_stage_run(&db.conn, run_id, &report)?;
    Ok(report)
}

/// Split one artifact into ceil(duration / length) contiguous pieces and
/// register them in a single transaction. A failure mid-split rolls back
/// every row, leaving the artifact eligible for retry.
fn split_audio_file(
    db: &Database,
    audio_file: &AudioFile,
    segment_length_ms: u64,
) -> Result<usize, StageError> {
    let input = Path::new(&audio_file.file_path);
    if !input.is_file() {
        return Err(StageError::MissingInput(format!(
            "audio file not found: {}",
            audio_file.file_path
        )));
    }

    let duration_secs = audio::wav_duration_seconds(input)
        .map_err(|e| StageError::Audio(e.to_string()))?;
    let total_ms = (duration_secs * 1000.0).round() as u64;
    if total_ms == 0 {
        return Err(StageError::MissingInput(format!(
            "audio file is empty: {}",
            audio_file.file_path
        )));
    }

    let segments_dir = Path::new(&audio_file.folder_path).join("segments");
    let segment_count = total_ms.div_ceil(segment_length_ms) as usize;

    let tx = db.conn.unchecked_transaction()?;
    for i in 0..segment_count {
        let start_ms = i as u64 * segment_length_ms;
        let end_ms = ((i as u64 + 1) * segment_length_ms).min(total_ms);
        let file_path = segments_dir.join(format!("segment_{}.wav", i + 1));

        audio::slice_wav(input, start_ms, end_ms, &file_path)
            .map_err(|e| StageError::Audio(e.to_string()))?;

        tx.execute(
            "INSERT INTO segments (audio_id, start_seconds, end_seconds, duration_seconds, file_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                audio_file.audio_id,
                start_ms as f64 / 1000.0,
                end_ms as f64 / 1000.0,
                (end_ms - start_ms) as f64 / 1000.0,
                file_path.to_string_lossy().into_owned(),
            ],
        )?;
    }
    tx.commit()?;

    Ok(segment_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn project_with_audio(
        dir: &tempfile::TempDir,
        duration_secs: u32,
    ) -> (Database, crate::db::models::Project) {
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        let project = db.create_or_get_project("p", dir.path()).unwrap();
        let src = db
            .insert_source(project.project_id, "talk.wav", "", "", None)
            .unwrap();

        let folder = dir.path().join("p").join("1");
        std::fs::create_dir_all(&folder).unwrap();
        let wav = folder.join("talk.wav");
        crate::audio::write_ramp_wav(&wav, 8000, 8000 * duration_secs);

        db.insert_audio_file(
            project.project_id,
            src,
            "talk.wav",
            folder.to_str().unwrap(),
            wav.to_str().unwrap(),
            Some(duration_secs as f64),
        )
        .unwrap();
        (db, project)
    }

    #[test]
    fn coverage_is_contiguous_and_complete() {
        let dir = tempdir().unwrap();
        let (db, project) = project_with_audio(&dir, 25);

        // 25s at 10s per segment -> 3 segments: [0,10) [10,20) [20,25)
        let report = segment_all(&db, &project, 10.0).unwrap();
        assert_eq!(report.processed, 1);

        let audio = &db.list_audio_files(project.project_id).unwrap()[0];
        let segments = db.list_segments(audio.audio_id).unwrap();
        assert_eq!(segments.len(), 3);

        let mut expected_start = 0.0;
        for (i, seg) in segments.iter().enumerate() {
            assert!((seg.start_seconds - expected_start).abs() < 1e-9);
            let expected_end = ((i as f64 + 1.0) * 10.0).min(25.0);
            assert!((seg.end_seconds - expected_end).abs() < 1e-9);
            assert!(std::path::Path::new(&seg.file_path).is_file());
            expected_start = seg.end_seconds;
        }
        assert!((segments.last().unwrap().end_seconds - 25.0).abs() < 1e-9);
    }

    #[test]
    fn exact_multiple_produces_no_stub_segment() {
        let dir = tempdir().unwrap();
        let (db, project) = project_with_audio(&dir, 20);

        segment_all(&db, &project, 10.0).unwrap();
        let audio = &db.list_audio_files(project.project_id).unwrap()[0];
        assert_eq!(db.list_segments(audio.audio_id).unwrap().len(), 2);
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = tempdir().unwrap();
        let (db, project) = project_with_audio(&dir, 25);

        segment_all(&db, &project, 10.0).unwrap();
        let report = segment_all(&db, &project, 10.0).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);

        let audio = &db.list_audio_files(project.project_id).unwrap()[0];
        assert_eq!(db.list_segments(audio.audio_id).unwrap().len(), 3);
    }

    #[test]
    fn missing_file_leaves_no_partial_state() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        let project = db.create_or_get_project("p", dir.path()).unwrap();
        let src = db
            .insert_source(project.project_id, "gone.wav", "", "", None)
            .unwrap();
        db.insert_audio_file(
            project.project_id,
            src,
            "gone.wav",
            "/nonexistent",
            "/nonexistent/gone.wav",
            None,
        )
        .unwrap();

        let report = segment_all(&db, &project, 10.0).unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.failures[0].reason.contains("missing input"));
        let audio = &db.list_audio_files(project.project_id).unwrap()[0];
        assert!(db.list_segments(audio.audio_id).unwrap().is_empty());
    }
}
