use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::audio;
use crate::db::models::Project;
use crate::db::Database;
use crate::pipeline::{complete_stage_run, start_stage_run, StageError, StageReport};

pub struct FetchedAudio {
    pub file_name: String,
    pub file_path: PathBuf,
}

/// Acquisition collaborator: turn a source locator into an audio file on
/// disk under `dest_dir`. Download, capture, and codec conversion all live
/// behind this seam.
pub trait AudioFetcher {
    fn fetch(&self, locator: &str, dest_dir: &Path) -> Result<FetchedAudio>;
}

/// Copies a local file (optionally `file://`-prefixed) into the project layout.
pub struct LocalFileFetcher;

impl AudioFetcher for LocalFileFetcher {
    fn fetch(&self, locator: &str, dest_dir: &Path) -> Result<FetchedAudio> {
        let src = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        if !src.is_file() {
            bail!("Local audio file not found: {}", src.display());
        }
        let file_name = src
            .file_name()
            .and_then(|n| n.to_str())
            .context("Source path has no usable file name")?
            .to_string();
        let dest = dest_dir.join(&file_name);
        std::fs::copy(src, &dest)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
        Ok(FetchedAudio {
            file_name,
            file_path: dest,
        })
    }
}

/// Downloads a remote audio file over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioFetcher for HttpFetcher {
    fn fetch(&self, locator: &str, dest_dir: &Path) -> Result<FetchedAudio> {
        let resp = self
            .client
            .get(locator)
            .send()
            .with_context(|| format!("Failed to request {locator}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Download of {locator} returned {status}");
        }

        let file_name = locator
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("audio.wav")
            .to_string();
        let bytes = resp.bytes().context("Failed to read download body")?;
        let dest = dest_dir.join(&file_name);
        std::fs::write(&dest, &bytes)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(FetchedAudio {
            file_name,
            file_path: dest,
        })
    }
}

/// Dispatches on locator scheme: http(s) downloads, everything else is
/// treated as a local path.
pub struct DefaultFetcher {
    http: HttpFetcher,
    local: LocalFileFetcher,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self {
            http: HttpFetcher::new(),
            local: LocalFileFetcher,
        }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioFetcher for DefaultFetcher {
    fn fetch(&self, locator: &str, dest_dir: &Path) -> Result<FetchedAudio> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            self.http.fetch(locator, dest_dir)
        } else {
            self.local.fetch(locator, dest_dir)
        }
    }
}

/// Acquire audio for every source in the project that has no artifact yet.
pub fn fetch_all(
    db: &Database,
    project: &Project,
    fetcher: &dyn AudioFetcher,
) -> Result<StageReport> {
    let start = Instant::now();
    let mut report = StageReport::new("fetch");
    let run_id = start_stage_run(&db.conn, report.stage)?;

    let sources = db.list_sources(project.project_id)?;
    if sources.is_empty() {
        info!(
            "No sources found for project '{}'; add some first",
            project.project_name
        );
    }

    for source in &sources {
        if db.audio_exists_for_source(source.source_id)? {
            info!("Audio already acquired for source {}", source.locator);
            report.record_skipped();
            continue;
        }

        match fetch_one(db, project, source.source_id, &source.locator, fetcher) {
            Ok(()) => report.record_processed(),
            Err(e) => {
                warn!("Fetch failed for {}: {e}", source.locator);
                report.record_failure(&source.locator, &e);
            }
        }
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    complete_stage_run(&db.conn, run_id, &report)?;
    Ok(report)
}

fn fetch_one(
    db: &Database,
    project: &Project,
    source_id: i64,
    locator: &str,
    fetcher: &dyn AudioFetcher,
) -> Result<(), StageError> {
    let dest_dir = Path::new(&project.root_path).join(source_id.to_string());
    std::fs::create_dir_all(&dest_dir)
        .map_err(|e| StageError::Audio(format!("cannot create {}: {e}", dest_dir.display())))?;

    let fetched = fetcher
        .fetch(locator, &dest_dir)
        .map_err(|e| StageError::Collaborator(e.to_string()))?;

    // Codec conversion is out of scope; a non-WAV artifact gets a NULL
    // duration and the segment stage will report it instead.
    let duration = match audio::wav_duration_seconds(&fetched.file_path) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(
                "Could not probe {} as WAV ({e}); storing without duration",
                fetched.file_path.display()
            );
            None
        }
    };

    db.insert_audio_file(
        project.project_id,
        source_id,
        &fetched.file_name,
        &dest_dir.to_string_lossy(),
        &fetched.file_path.to_string_lossy(),
        duration,
    )
    .map_err(StageError::store)?;

    info!("Acquired {} -> {}", locator, fetched.file_path.display());
    Ok(())
}
