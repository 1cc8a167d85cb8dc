//! End-to-end pipeline runs against a temporary store with fake
//! collaborators, checking the idempotency contract across every stage.

use anyhow::Result;
use std::path::Path;
use tempfile::tempdir;

use voxmap::cluster;
use voxmap::db::Database;
use voxmap::pipeline::embed::{Diarizer, SpeakerTrack, SpeechTurn};
use voxmap::pipeline::fetch::LocalFileFetcher;
use voxmap::pipeline::transcribe::Transcriber;
use voxmap::pipeline::{derive, embed, fetch, segment, transcribe};

fn write_wav(path: &Path, sample_rate: u32, seconds: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(sample_rate * seconds) {
        writer.write_sample((i % 20000) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Two stable voices per segment, far apart in embedding space.
struct TwoSpeakerDiarizer;

impl Diarizer for TwoSpeakerDiarizer {
    fn diarize(&self, _audio: &Path) -> Result<Vec<SpeakerTrack>> {
        Ok(vec![
            SpeakerTrack {
                speaker: "SPEAKER_00".into(),
                embedding: vec![0.0, 0.1, 0.0],
                turns: vec![
                    SpeechTurn { start: 0.5, end: 3.5 },
                    SpeechTurn { start: 6.0, end: 6.4 }, // below the 1.0s minimum
                ],
            },
            SpeakerTrack {
                speaker: "SPEAKER_01".into(),
                embedding: vec![7.0, 7.0, 7.0],
                turns: vec![SpeechTurn { start: 4.0, end: 7.5 }],
            },
        ])
    }
}

struct EchoTranscriber;

impl Transcriber for EchoTranscriber {
    fn transcribe(&self, audio: &Path) -> Result<String> {
        Ok(format!("spoken words ({})", audio.file_name().unwrap().to_string_lossy()))
    }
}

#[test]
fn full_pipeline_is_idempotent() {
    let dir = tempdir().unwrap();
    let db = Database::open(&dir.path().join("voxmap.db")).unwrap();
    let project = db.create_or_get_project("lectures", dir.path()).unwrap();

    // one 25-second recording registered as a local source
    let recording = dir.path().join("recording.wav");
    write_wav(&recording, 8000, 25);
    db.insert_source(
        project.project_id,
        recording.to_str().unwrap(),
        "Lecture 1",
        "prof",
        None,
    )
    .unwrap();

    let run = |db: &Database| {
        let f = fetch::fetch_all(db, &project, &LocalFileFetcher).unwrap();
        let s = segment::segment_all(db, &project, 10.0).unwrap();
        let e = embed::embed_all(db, &project, &TwoSpeakerDiarizer, 1.0).unwrap();
        let c = cluster::cluster_and_label(db, 1.0, false).unwrap();
        let d = derive::derive_all(db, &project).unwrap();
        let t = transcribe::transcribe_all(db, &EchoTranscriber).unwrap();
        (f, s, e, c, d, t)
    };

    let (f1, s1, e1, c1, d1, t1) = run(&db);
    assert_eq!(f1.processed, 1);
    assert_eq!(s1.processed, 1);
    assert_eq!(e1.processed, 3); // ceil(25/10) segments
    assert_eq!(c1.clusters, 2);
    // 3 segments x (1 long turn + 1 long turn) surviving intervals = 6
    assert_eq!(d1.processed, 6);
    assert_eq!(t1.processed, 6);

    let stats_after_first = db.stats().unwrap();
    assert_eq!(stats_after_first.segments, 3);
    assert_eq!(stats_after_first.embeddings, 6);
    assert_eq!(stats_after_first.speech_intervals, 6);
    assert_eq!(stats_after_first.labels, 2);
    assert_eq!(stats_after_first.label_assignments, 6);
    assert_eq!(stats_after_first.derived_segments, 6);
    assert_eq!(stats_after_first.transcripts, 6);

    // second run: everything is guarded, nothing is duplicated
    let (f2, s2, e2, c2, d2, t2) = run(&db);
    assert_eq!(f2.processed, 0);
    assert_eq!(s2.processed, 0);
    assert_eq!(e2.processed, 0);
    assert_eq!(c2.labels_created, 0);
    assert_eq!(c2.assignments_added, 0);
    assert_eq!(d2.processed, 0);
    assert_eq!(t2.processed, 0);
    assert_eq!(f2.skipped + s2.skipped + e2.skipped, 1 + 1 + 3);

    let stats_after_second = db.stats().unwrap();
    assert_eq!(stats_after_second.segments, stats_after_first.segments);
    assert_eq!(stats_after_second.embeddings, stats_after_first.embeddings);
    assert_eq!(
        stats_after_second.speech_intervals,
        stats_after_first.speech_intervals
    );
    assert_eq!(stats_after_second.labels, stats_after_first.labels);
    assert_eq!(
        stats_after_second.label_assignments,
        stats_after_first.label_assignments
    );
    assert_eq!(
        stats_after_second.derived_segments,
        stats_after_first.derived_segments
    );
    assert_eq!(stats_after_second.transcripts, stats_after_first.transcripts);
}

#[test]
fn derived_artifacts_land_in_final_segments_dir() {
    let dir = tempdir().unwrap();
    let db = Database::open(&dir.path().join("voxmap.db")).unwrap();
    let project = db.create_or_get_project("talks", dir.path()).unwrap();

    let recording = dir.path().join("talk.wav");
    write_wav(&recording, 8000, 12);
    db.insert_source(project.project_id, recording.to_str().unwrap(), "", "", None)
        .unwrap();

    fetch::fetch_all(&db, &project, &LocalFileFetcher).unwrap();
    segment::segment_all(&db, &project, 12.0).unwrap();
    embed::embed_all(&db, &project, &TwoSpeakerDiarizer, 1.0).unwrap();
    cluster::cluster_and_label(&db, 1.0, false).unwrap();
    derive::derive_all(&db, &project).unwrap();

    let final_dir = Path::new(&project.root_path).join("FinalSegments");
    assert!(final_dir.is_dir());
    for d in db.list_derived_segments().unwrap() {
        let path = Path::new(&d.file_path);
        assert!(path.starts_with(&final_dir));
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("segment_{}.wav", d.interval_id)
        );
        assert!(path.is_file());
        assert!(d.label_id.is_some());
    }

    // the playback contract: every derived path is reachable via its label
    let labels = db.list_label_counts().unwrap();
    let total_paths: usize = labels
        .iter()
        .map(|l| db.derived_paths_for_label(&l.label_name).unwrap().len())
        .sum();
    assert_eq!(total_paths, db.list_derived_segments().unwrap().len());
}

#[test]
fn segment_sources_layout_matches_source_id() {
    let dir = tempdir().unwrap();
    let db = Database::open(&dir.path().join("voxmap.db")).unwrap();
    let project = db.create_or_get_project("layout", dir.path()).unwrap();

    let recording = dir.path().join("a.wav");
    write_wav(&recording, 8000, 5);
    let source_id = db
        .insert_source(project.project_id, recording.to_str().unwrap(), "", "", None)
        .unwrap();

    fetch::fetch_all(&db, &project, &LocalFileFetcher).unwrap();
    segment::segment_all(&db, &project, 2.0).unwrap();

    let audio = &db.list_audio_files(project.project_id).unwrap()[0];
    let expected_dir = Path::new(&project.root_path).join(source_id.to_string());
    assert_eq!(Path::new(&audio.folder_path), expected_dir);

    let segments = db.list_segments(audio.audio_id).unwrap();
    assert_eq!(segments.len(), 3); // ceil(5/2)
    for (i, seg) in segments.iter().enumerate() {
        let expected = expected_dir
            .join("segments")
            .join(format!("segment_{}.wav", i + 1));
        assert_eq!(Path::new(&seg.file_path), expected);
    }
}
