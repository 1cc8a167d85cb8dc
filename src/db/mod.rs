pub mod migrations;
pub mod models;
pub mod schema;

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::info;

use models::*;

pub struct Database {
    pub conn: Connection,
    pub path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Performance pragmas
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;",
        )?;

        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;

        info!("Opened database: {}", path.display());

        Ok(Database {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Default database path: ~/.voxmap/voxmap.db
    pub fn default_db_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".voxmap").join("voxmap.db"))
    }

    // ---- projects ----

    /// Get a project by name, creating it (and its root directory) if absent.
    pub fn create_or_get_project(&self, name: &str, data_dir: &Path) -> Result<Project> {
        if let Some(existing) = self.get_project(name)? {
            info!("Continuing with existing project: {}", existing.project_name);
            return Ok(existing);
        }

        let root_path = data_dir.join(name);
        std::fs::create_dir_all(&root_path)
            .with_context(|| format!("Failed to create project directory: {}", root_path.display()))?;

        self.conn.execute(
            "INSERT INTO projects (project_name, root_path) VALUES (?1, ?2)",
            rusqlite::params![name, root_path.to_string_lossy().into_owned()],
        )?;

        let project = self
            .get_project(name)?
            .context("Project vanished immediately after insert")?;
        info!("Created project '{}' (id {})", name, project.project_id);
        Ok(project)
    }

    pub fn get_project(&self, name: &str) -> Result<Option<Project>> {
        let result = self
            .conn
            .prepare(
                "SELECT project_id, project_name, description, root_path, created_at
                 FROM projects WHERE project_name = ?1",
            )?
            .query_row([name], |row| {
                Ok(Project {
                    project_id: row.get(0)?,
                    project_name: row.get(1)?,
                    description: row.get(2)?,
                    root_path: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, project_name, description, root_path, created_at
             FROM projects ORDER BY project_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Project {
                project_id: row.get(0)?,
                project_name: row.get(1)?,
                description: row.get(2)?,
                root_path: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    pub fn set_project_description(&self, project_id: i64, description: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE projects SET description = ?2 WHERE project_id = ?1",
            rusqlite::params![project_id, description],
        )?;
        Ok(())
    }

    /// Delete a project and everything under it (cascading).
    pub fn delete_project(&self, project_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM projects WHERE project_id = ?1", [project_id])?;
        Ok(deleted > 0)
    }

    // ---- sources ----

    pub fn source_exists(&self, project_id: i64, locator: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sources WHERE project_id = ?1 AND locator = ?2",
            rusqlite::params![project_id, locator],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_source(
        &self,
        project_id: i64,
        locator: &str,
        title: &str,
        author: &str,
        views: Option<i64>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sources (project_id, locator, title, author, views)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![project_id, locator, title, author, views],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_sources(&self, project_id: i64) -> Result<Vec<Source>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, project_id, locator, title, author, views, created_at
             FROM sources WHERE project_id = ?1 ORDER BY source_id",
        )?;
        let rows = stmt.query_map([project_id], |row| {
            Ok(Source {
                source_id: row.get(0)?,
                project_id: row.get(1)?,
                locator: row.get(2)?,
                title: row.get(3)?,
                author: row.get(4)?,
                views: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    // ---- audio files ----

    /// Stage guard for acquisition: has this source already produced an artifact?
    pub fn audio_exists_for_source(&self, source_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM audio_files WHERE source_id = ?1",
            [source_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_audio_file(
        &self,
        project_id: i64,
        source_id: i64,
        file_name: &str,
        folder_path: &str,
        file_path: &str,
        duration_seconds: Option<f64>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO audio_files (project_id, source_id, file_name, folder_path, file_path, duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![project_id, source_id, file_name, folder_path, file_path, duration_seconds],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_audio_files(&self, project_id: i64) -> Result<Vec<AudioFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT audio_id, project_id, source_id, file_name, folder_path, file_path, duration_seconds, created_at
             FROM audio_files WHERE project_id = ?1 ORDER BY audio_id",
        )?;
        let rows = stmt.query_map([project_id], |row| {
            Ok(AudioFile {
                audio_id: row.get(0)?,
                project_id: row.get(1)?,
                source_id: row.get(2)?,
                file_name: row.get(3)?,
                folder_path: row.get(4)?,
                file_path: row.get(5)?,
                duration_seconds: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    // ---- segments ----

    /// Stage guard for segmentation.
    pub fn has_segments(&self, audio_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM segments WHERE audio_id = ?1",
            [audio_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_segments(&self, audio_id: i64) -> Result<Vec<Segment>> {
        let mut stmt = self.conn.prepare(
            "SELECT segment_id, audio_id, start_seconds, end_seconds, duration_seconds, file_path, created_at
             FROM segments WHERE audio_id = ?1 ORDER BY start_seconds",
        )?;
        let rows = stmt.query_map([audio_id], |row| {
            Ok(Segment {
                segment_id: row.get(0)?,
                audio_id: row.get(1)?,
                start_seconds: row.get(2)?,
                end_seconds: row.get(3)?,
                duration_seconds: row.get(4)?,
                file_path: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }

    pub fn list_segments_for_project(&self, project_id: i64) -> Result<Vec<Segment>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.segment_id, s.audio_id, s.start_seconds, s.end_seconds, s.duration_seconds, s.file_path, s.created_at
             FROM segments s
             JOIN audio_files a ON a.audio_id = s.audio_id
             WHERE a.project_id = ?1
             ORDER BY s.segment_id",
        )?;
        let rows = stmt.query_map([project_id], |row| {
            Ok(Segment {
                segment_id: row.get(0)?,
                audio_id: row.get(1)?,
                start_seconds: row.get(2)?,
                end_seconds: row.get(3)?,
                duration_seconds: row.get(4)?,
                file_path: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }

    // ---- embeddings ----

    /// Stage guard for embedding extraction.
    pub fn has_embeddings(&self, segment_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE segment_id = ?1",
            [segment_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Load every embedding vector in the store, decoded, in id order.
    /// This is the clustering input: project-wide, not per-run-incremental.
    pub fn all_embedding_vectors(&self) -> Result<Vec<EmbeddingVector>> {
        let mut stmt = self
            .conn
            .prepare("SELECT embedding_id, segment_id, vector FROM embeddings ORDER BY embedding_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;
        let mut vectors = Vec::new();
        for row in rows {
            let (embedding_id, segment_id, blob) = row?;
            let vector = decode_vector(&blob)
                .with_context(|| format!("Corrupt vector blob for embedding {embedding_id}"))?;
            vectors.push(EmbeddingVector {
                embedding_id,
                segment_id,
                vector,
            });
        }
        Ok(vectors)
    }

    pub fn delete_embedding(&self, embedding_id: i64) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM embeddings WHERE embedding_id = ?1",
            [embedding_id],
        )?;
        Ok(deleted > 0)
    }

    // ---- speech intervals ----

    pub fn list_intervals_for_embedding(&self, embedding_id: i64) -> Result<Vec<SpeechInterval>> {
        let mut stmt = self.conn.prepare(
            "SELECT interval_id, embedding_id, start_seconds, end_seconds, created_at
             FROM speech_intervals WHERE embedding_id = ?1 ORDER BY start_seconds",
        )?;
        let rows = stmt.query_map([embedding_id], |row| {
            Ok(SpeechInterval {
                interval_id: row.get(0)?,
                embedding_id: row.get(1)?,
                start_seconds: row.get(2)?,
                end_seconds: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut intervals = Vec::new();
        for row in rows {
            intervals.push(row?);
        }
        Ok(intervals)
    }

    /// Every speech interval joined up to its parent segment's audio path,
    /// as consumed by the derived-segment materializer.
    pub fn list_interval_slices(&self) -> Result<Vec<IntervalSlice>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.interval_id, i.embedding_id, i.start_seconds, i.end_seconds, s.file_path
             FROM speech_intervals i
             JOIN embeddings e ON e.embedding_id = i.embedding_id
             JOIN segments s ON s.segment_id = e.segment_id
             ORDER BY i.interval_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IntervalSlice {
                interval_id: row.get(0)?,
                embedding_id: row.get(1)?,
                start_seconds: row.get(2)?,
                end_seconds: row.get(3)?,
                segment_path: row.get(4)?,
            })
        })?;
        let mut slices = Vec::new();
        for row in rows {
            slices.push(row?);
        }
        Ok(slices)
    }

    // ---- labels ----

    pub fn get_label_by_name(&self, name: &str) -> Result<Option<Label>> {
        let result = self
            .conn
            .prepare("SELECT label_id, label_name, created_at FROM labels WHERE label_name = ?1")?
            .query_row([name], |row| {
                Ok(Label {
                    label_id: row.get(0)?,
                    label_name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    pub fn list_label_counts(&self) -> Result<Vec<LabelCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.label_id, l.label_name, COUNT(el.embedding_id)
             FROM labels l
             LEFT JOIN embedding_labels el ON el.label_id = l.label_id
             GROUP BY l.label_id
             ORDER BY l.label_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LabelCount {
                label_id: row.get(0)?,
                label_name: row.get(1)?,
                embeddings: row.get(2)?,
            })
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Rename a label. Rejects a missing old name and an already-taken new name.
    pub fn rename_label(&self, old_name: &str, new_name: &str) -> Result<()> {
        let Some(label) = self.get_label_by_name(old_name)? else {
            bail!("Label '{old_name}' does not exist");
        };
        if self.get_label_by_name(new_name)?.is_some() {
            bail!("Label name '{new_name}' is already in use");
        }
        self.conn.execute(
            "UPDATE labels SET label_name = ?2 WHERE label_id = ?1",
            rusqlite::params![label.label_id, new_name],
        )?;
        Ok(())
    }

    /// Everywhere a labeled speaker was heard: one row per (assignment, interval).
    pub fn label_occurrences(&self, label_name: &str) -> Result<Vec<LabelOccurrence>> {
        let mut stmt = self.conn.prepare(
            "SELECT src.title, s.audio_id, s.segment_id, i.interval_id, i.start_seconds, i.end_seconds
             FROM labels l
             JOIN embedding_labels el ON el.label_id = l.label_id
             JOIN embeddings e ON e.embedding_id = el.embedding_id
             JOIN speech_intervals i ON i.embedding_id = e.embedding_id
             JOIN segments s ON s.segment_id = e.segment_id
             JOIN audio_files a ON a.audio_id = s.audio_id
             JOIN sources src ON src.source_id = a.source_id
             WHERE l.label_name = ?1
             ORDER BY s.audio_id, i.start_seconds",
        )?;
        let rows = stmt.query_map([label_name], |row| {
            Ok(LabelOccurrence {
                title: row.get(0)?,
                audio_id: row.get(1)?,
                segment_id: row.get(2)?,
                interval_id: row.get(3)?,
                start_seconds: row.get(4)?,
                end_seconds: row.get(5)?,
            })
        })?;
        let mut occurrences = Vec::new();
        for row in rows {
            occurrences.push(row?);
        }
        Ok(occurrences)
    }

    /// First label assigned to an embedding, if any.
    pub fn first_label_for_embedding(&self, embedding_id: i64) -> Result<Option<i64>> {
        let result = self
            .conn
            .query_row(
                "SELECT label_id FROM embedding_labels WHERE embedding_id = ?1 ORDER BY label_id LIMIT 1",
                [embedding_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn count_label_assignments(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM embedding_labels", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Ordered derived-segment file paths for a label — the playback
    /// contract. Resolved through the embedding-label join rather than the
    /// snapshot label column on derived rows, so re-labeled embeddings are
    /// reachable under their current names.
    pub fn derived_paths_for_label(&self, label_name: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.file_path
             FROM labels l
             JOIN embedding_labels el ON el.label_id = l.label_id
             JOIN speech_intervals i ON i.embedding_id = el.embedding_id
             JOIN derived_segments d ON d.interval_id = i.interval_id
             WHERE l.label_name = ?1
             ORDER BY d.interval_id",
        )?;
        let rows = stmt.query_map([label_name], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    /// Degraded playback mode: parent segment paths for every embedding
    /// carrying the label, used when derivation hasn't run.
    pub fn segment_paths_for_label(&self, label_name: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT s.file_path
             FROM labels l
             JOIN embedding_labels el ON el.label_id = l.label_id
             JOIN embeddings e ON e.embedding_id = el.embedding_id
             JOIN segments s ON s.segment_id = e.segment_id
             WHERE l.label_name = ?1
             ORDER BY s.file_path",
        )?;
        let rows = stmt.query_map([label_name], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    // ---- derived segments ----

    /// Stage guard for derivation, exact per interval.
    pub fn has_derived_segment(&self, interval_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM derived_segments WHERE interval_id = ?1",
            [interval_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_derived_segment(
        &self,
        interval_id: i64,
        label_id: Option<i64>,
        file_path: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO derived_segments (interval_id, label_id, file_path) VALUES (?1, ?2, ?3)",
            rusqlite::params![interval_id, label_id, file_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_derived_segments(&self) -> Result<Vec<DerivedSegment>> {
        let mut stmt = self.conn.prepare(
            "SELECT derived_id, interval_id, label_id, file_path, created_at
             FROM derived_segments ORDER BY interval_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DerivedSegment {
                derived_id: row.get(0)?,
                interval_id: row.get(1)?,
                label_id: row.get(2)?,
                file_path: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut derived = Vec::new();
        for row in rows {
            derived.push(row?);
        }
        Ok(derived)
    }

    // ---- transcripts ----

    /// Stage guard for transcription, exact per interval.
    pub fn has_transcript(&self, interval_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE interval_id = ?1",
            [interval_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_transcript(&self, interval_id: i64, text: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO transcripts (interval_id, text) VALUES (?1, ?2)",
            rusqlite::params![interval_id, text],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // ---- stats ----

    pub fn stats(&self) -> Result<DbStats> {
        let count = |table: &str| -> Result<i64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(n)
        };

        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(DbStats {
            projects: count("projects")?,
            sources: count("sources")?,
            audio_files: count("audio_files")?,
            segments: count("segments")?,
            embeddings: count("embeddings")?,
            speech_intervals: count("speech_intervals")?,
            labels: count("labels")?,
            label_assignments: count("embedding_labels")?,
            derived_segments: count("derived_segments")?,
            transcripts: count("transcripts")?,
            db_size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_test_db(dir: &tempfile::TempDir) -> Database {
        Database::open(&dir.path().join("test.db")).unwrap()
    }

    #[test]
    fn create_or_get_project_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = open_test_db(&dir);

        let a = db.create_or_get_project("interviews", dir.path()).unwrap();
        let b = db.create_or_get_project("interviews", dir.path()).unwrap();
        assert_eq!(a.project_id, b.project_id);
        assert_eq!(db.list_projects().unwrap().len(), 1);
        assert!(dir.path().join("interviews").is_dir());
    }

    #[test]
    fn source_uniqueness_is_per_project() {
        let dir = tempdir().unwrap();
        let db = open_test_db(&dir);
        let p1 = db.create_or_get_project("one", dir.path()).unwrap();
        let p2 = db.create_or_get_project("two", dir.path()).unwrap();

        db.insert_source(p1.project_id, "file:///a.wav", "", "", None)
            .unwrap();
        assert!(db.source_exists(p1.project_id, "file:///a.wav").unwrap());
        assert!(!db.source_exists(p2.project_id, "file:///a.wav").unwrap());
        // same locator under another project is fine
        db.insert_source(p2.project_id, "file:///a.wav", "", "", None)
            .unwrap();
    }

    #[test]
    fn deleting_embedding_cascades_assignments_but_keeps_label() {
        let dir = tempdir().unwrap();
        let db = open_test_db(&dir);
        let p = db.create_or_get_project("p", dir.path()).unwrap();
        let src = db.insert_source(p.project_id, "x", "", "", None).unwrap();
        let audio = db
            .insert_audio_file(p.project_id, src, "a.wav", "/tmp", "/tmp/a.wav", Some(10.0))
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO segments (audio_id, start_seconds, end_seconds, duration_seconds, file_path)
                 VALUES (?1, 0, 10, 10, '/tmp/seg.wav')",
                [audio],
            )
            .unwrap();
        let seg_id = db.conn.last_insert_rowid();

        for _ in 0..2 {
            db.conn
                .execute(
                    "INSERT INTO embeddings (segment_id, vector) VALUES (?1, ?2)",
                    rusqlite::params![seg_id, encode_vector(&[1.0, 2.0])],
                )
                .unwrap();
        }
        let embeddings = db.all_embedding_vectors().unwrap();
        assert_eq!(embeddings.len(), 2);

        db.conn
            .execute("INSERT INTO labels (label_name) VALUES ('Speaker 1')", [])
            .unwrap();
        let label_id = db.conn.last_insert_rowid();
        for e in &embeddings {
            db.conn
                .execute(
                    "INSERT INTO embedding_labels (embedding_id, label_id) VALUES (?1, ?2)",
                    [e.embedding_id, label_id],
                )
                .unwrap();
        }
        assert_eq!(db.count_label_assignments().unwrap(), 2);

        assert!(db.delete_embedding(embeddings[0].embedding_id).unwrap());
        // assignment rows for the deleted embedding are gone, the label stays
        assert_eq!(db.count_label_assignments().unwrap(), 1);
        assert!(db.get_label_by_name("Speaker 1").unwrap().is_some());
    }

    #[test]
    fn rename_label_rejects_conflicts() {
        let dir = tempdir().unwrap();
        let db = open_test_db(&dir);
        db.conn
            .execute("INSERT INTO labels (label_name) VALUES ('Speaker 1')", [])
            .unwrap();
        db.conn
            .execute("INSERT INTO labels (label_name) VALUES ('Speaker 2')", [])
            .unwrap();

        assert!(db.rename_label("Speaker 3", "Alice").is_err());
        assert!(db.rename_label("Speaker 1", "Speaker 2").is_err());
        db.rename_label("Speaker 1", "Alice").unwrap();
        assert!(db.get_label_by_name("Alice").unwrap().is_some());
        assert!(db.get_label_by_name("Speaker 1").unwrap().is_none());
    }

    #[test]
    fn project_delete_cascades_through_graph() {
        let dir = tempdir().unwrap();
        let db = open_test_db(&dir);
        let p = db.create_or_get_project("doomed", dir.path()).unwrap();
        let src = db.insert_source(p.project_id, "x", "", "", None).unwrap();
        db.insert_audio_file(p.project_id, src, "a.wav", "/tmp", "/tmp/a.wav", None)
            .unwrap();

        assert!(db.delete_project(p.project_id).unwrap());
        let stats = db.stats().unwrap();
        assert_eq!(stats.projects, 0);
        assert_eq!(stats.sources, 0);
        assert_eq!(stats.audio_files, 0);
    }
}
