use anyhow::Result;
use rusqlite::Connection;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Version tracking
        CREATE TABLE IF NOT EXISTS voxmap_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Core entity graph
        CREATE TABLE IF NOT EXISTS projects (
            project_id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            root_path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS sources (
            source_id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
            locator TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            views INTEGER,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            UNIQUE(project_id, locator)
        );

        CREATE TABLE IF NOT EXISTS audio_files (
            audio_id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
            source_id INTEGER NOT NULL REFERENCES sources(source_id) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            folder_path TEXT NOT NULL,
            file_path TEXT NOT NULL,
            duration_seconds REAL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS segments (
            segment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            audio_id INTEGER NOT NULL REFERENCES audio_files(audio_id) ON DELETE CASCADE,
            start_seconds REAL NOT NULL,
            end_seconds REAL NOT NULL,
            duration_seconds REAL NOT NULL,
            file_path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        -- vector is a raw little-endian f32 array; dimensionality is fixed
        -- by the diarization model and not stored alongside the blob
        CREATE TABLE IF NOT EXISTS embeddings (
            embedding_id INTEGER PRIMARY KEY AUTOINCREMENT,
            segment_id INTEGER NOT NULL REFERENCES segments(segment_id) ON DELETE CASCADE,
            vector BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS speech_intervals (
            interval_id INTEGER PRIMARY KEY AUTOINCREMENT,
            embedding_id INTEGER NOT NULL REFERENCES embeddings(embedding_id) ON DELETE CASCADE,
            start_seconds REAL NOT NULL,
            end_seconds REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        -- label names are a global namespace, independent of project lifecycle
        CREATE TABLE IF NOT EXISTS labels (
            label_id INTEGER PRIMARY KEY AUTOINCREMENT,
            label_name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS embedding_labels (
            embedding_id INTEGER NOT NULL REFERENCES embeddings(embedding_id) ON DELETE CASCADE,
            label_id INTEGER NOT NULL REFERENCES labels(label_id) ON DELETE CASCADE,
            PRIMARY KEY (embedding_id, label_id)
        );

        CREATE TABLE IF NOT EXISTS derived_segments (
            derived_id INTEGER PRIMARY KEY AUTOINCREMENT,
            interval_id INTEGER NOT NULL UNIQUE REFERENCES speech_intervals(interval_id) ON DELETE CASCADE,
            label_id INTEGER REFERENCES labels(label_id),
            file_path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS transcripts (
            transcript_id INTEGER PRIMARY KEY AUTOINCREMENT,
            interval_id INTEGER NOT NULL UNIQUE REFERENCES speech_intervals(interval_id) ON DELETE CASCADE,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        -- Run accounting
        CREATE TABLE IF NOT EXISTS stage_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            stage TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            processed INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'running'
        );

        -- Indexes for the per-stage existence guards and label joins
        CREATE INDEX IF NOT EXISTS idx_sources_project ON sources(project_id);
        CREATE INDEX IF NOT EXISTS idx_audio_files_project ON audio_files(project_id);
        CREATE INDEX IF NOT EXISTS idx_audio_files_source ON audio_files(source_id);
        CREATE INDEX IF NOT EXISTS idx_segments_audio ON segments(audio_id);
        CREATE INDEX IF NOT EXISTS idx_embeddings_segment ON embeddings(segment_id);
        CREATE INDEX IF NOT EXISTS idx_intervals_embedding ON speech_intervals(embedding_id);
        CREATE INDEX IF NOT EXISTS idx_embedding_labels_label ON embedding_labels(label_id);
        CREATE INDEX IF NOT EXISTS idx_derived_label ON derived_segments(label_id);
        ",
    )?;

    // initial version only; migrations move it forward from here
    conn.execute(
        "INSERT OR IGNORE INTO voxmap_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
