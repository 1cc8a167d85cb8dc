use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use voxmap::cluster;
use voxmap::config::{self, VoxmapConfig};
use voxmap::db::Database;
use voxmap::output::{json as json_out, table};
use voxmap::pipeline::derive::FINAL_SEGMENTS_DIR;
use voxmap::pipeline::embed::{Diarizer, HttpDiarizer};
use voxmap::pipeline::fetch::DefaultFetcher;
use voxmap::pipeline::transcribe::{HttpTranscriber, Transcriber};
use voxmap::pipeline::{self, StageReport};

#[derive(Parser)]
#[command(name = "voxmap", version, about = "voxmap — map who spoke when across long-form audio, one resumable stage at a time")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to database file (default: ~/.voxmap/voxmap.db)
    #[arg(long, global = true, env = "VOXMAP_DB")]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project, or continue with an existing one
    Init {
        /// Project name (spaces become underscores)
        name: String,
    },

    /// List projects
    Projects,

    /// Delete a project and everything under it
    Delete {
        /// Project name
        name: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Register audio sources (local paths, globs, or http(s) URLs)
    Add {
        /// Project name
        project: String,

        /// Source locators
        locators: Vec<String>,

        /// Title stored with each source
        #[arg(long)]
        title: Option<String>,

        /// Author stored with each source
        #[arg(long)]
        author: Option<String>,
    },

    /// List a project's sources
    Sources {
        /// Project name
        project: String,
    },

    /// List a project's acquired audio files
    Audio {
        /// Project name
        project: String,
    },

    /// Set a project's description
    Describe {
        /// Project name
        project: String,
        /// Description text
        description: String,
    },

    /// Acquire audio for sources that don't have an artifact yet
    Fetch {
        /// Project name
        project: String,
    },

    /// Split acquired audio into fixed-length segments
    Segment {
        /// Project name
        project: String,

        /// Segment length in seconds
        #[arg(long)]
        length_secs: Option<f64>,
    },

    /// Run diarization and store speaker embeddings per segment
    Embed {
        /// Project name
        project: String,

        /// Minimum speech-interval duration in seconds
        #[arg(long)]
        min_interval: Option<f64>,

        /// Diarization service base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Diarization service API key
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Cluster all stored embeddings into speaker identities
    Cluster {
        /// Dendrogram cut distance
        #[arg(long)]
        threshold: Option<f64>,

        /// Clear all existing label assignments before assigning
        #[arg(long)]
        reconcile: bool,
    },

    /// Materialize one audio artifact per labeled speech interval
    Derive {
        /// Project name
        project: String,
    },

    /// Transcribe derived segments
    Transcribe {
        /// Project name
        project: String,

        /// Transcription service base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Transcription service API key
        #[arg(long)]
        api_key: Option<String>,

        /// Scan the FinalSegments directory instead of the store
        #[arg(long)]
        scan_dir: bool,
    },

    /// Run the whole pipeline: fetch, segment, embed, cluster, derive, transcribe
    Run {
        /// Project name
        project: String,

        /// Segment length in seconds
        #[arg(long)]
        length_secs: Option<f64>,

        /// Minimum speech-interval duration in seconds
        #[arg(long)]
        min_interval: Option<f64>,

        /// Dendrogram cut distance
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// List labels with their embedding counts
    Labels,

    /// Label operations
    #[command(subcommand)]
    Label(LabelCommands),

    /// Show store statistics
    Stats,

    /// Show database info
    Info,

    /// Config file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum LabelCommands {
    /// Rename a label
    Rename {
        /// Current label name
        old: String,
        /// New label name
        new: String,
    },

    /// Show everywhere a labeled speaker was heard
    Info {
        /// Label name
        name: String,
    },

    /// Print the audio file paths associated with a label
    Paths {
        /// Label name
        name: String,

        /// Fall back to parent segment paths (no derivation needed)
        #[arg(long)]
        segments: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Create ~/.voxmap/config.toml with a commented template
    Init,
    /// Show the current config with secrets redacted
    Show,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;

    let db_path = cli
        .db
        .unwrap_or_else(|| Database::default_db_path().expect("Could not determine default DB path"));

    let db = Database::open(&db_path)?;
    let cfg = VoxmapConfig::load()?;

    match cli.command {
        Commands::Init { name } => {
            let name = name.replace(' ', "_");
            let project = db.create_or_get_project(&name, &cfg.data_directory()?)?;
            if json_output {
                json_out::print_json(&project)?;
            } else {
                println!(
                    "Project '{}' ready (id {}, root {})",
                    project.project_name, project.project_id, project.root_path
                );
            }
        }

        Commands::Projects => {
            let projects = db.list_projects()?;
            if json_output {
                json_out::print_json(&projects)?;
            } else {
                table::print_projects(&projects);
            }
        }

        Commands::Delete { name, force } => {
            let project = db
                .get_project(&name)?
                .with_context(|| format!("Project not found: {name}"))?;

            if !force {
                eprint!(
                    "Delete \"{}\" and all of its sources, audio, and labels? [y/N] ",
                    project.project_name
                );
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer)?;
                if !answer.trim().eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            db.delete_project(project.project_id)?;
            println!(
                "Deleted project '{}'. Files under {} were left on disk.",
                project.project_name, project.root_path
            );
        }

        Commands::Add {
            project,
            locators,
            title,
            author,
        } => {
            let project = get_project(&db, &project)?;
            if locators.is_empty() {
                bail!("No locators provided.");
            }

            let mut added = 0usize;
            let mut skipped = 0usize;
            for locator in expand_locators(&locators)? {
                if db.source_exists(project.project_id, &locator)? {
                    println!("Source already exists: {locator}");
                    skipped += 1;
                    continue;
                }
                db.insert_source(
                    project.project_id,
                    &locator,
                    title.as_deref().unwrap_or(""),
                    author.as_deref().unwrap_or(""),
                    None,
                )?;
                println!("Added source: {locator}");
                added += 1;
            }
            println!(
                "{added} source{} added, {skipped} already present.",
                if added == 1 { "" } else { "s" }
            );
        }

        Commands::Sources { project } => {
            let project = get_project(&db, &project)?;
            let sources = db.list_sources(project.project_id)?;
            if json_output {
                json_out::print_json(&sources)?;
            } else {
                table::print_sources(&sources);
            }
        }

        Commands::Audio { project } => {
            let project = get_project(&db, &project)?;
            let files = db.list_audio_files(project.project_id)?;
            if json_output {
                json_out::print_json(&files)?;
            } else {
                table::print_audio_files(&files);
            }
        }

        Commands::Describe { project, description } => {
            let project = get_project(&db, &project)?;
            db.set_project_description(project.project_id, &description)?;
            println!("Updated description for '{}'.", project.project_name);
        }

        Commands::Fetch { project } => {
            let project = get_project(&db, &project)?;
            let report = pipeline::fetch::fetch_all(&db, &project, &DefaultFetcher::new())?;
            print_report(json_output, &report)?;
        }

        Commands::Segment { project, length_secs } => {
            let project = get_project(&db, &project)?;
            let length = length_secs.unwrap_or_else(|| cfg.segment_length_secs());
            if length <= 0.0 {
                bail!("Segment length must be positive, got {length}");
            }
            let report = pipeline::segment::segment_all(&db, &project, length)?;
            print_report(json_output, &report)?;
        }

        Commands::Embed {
            project,
            min_interval,
            base_url,
            api_key,
        } => {
            let project = get_project(&db, &project)?;
            let diarizer = build_diarizer(&cfg, base_url.as_deref(), api_key.as_deref())?;
            let min_interval = min_interval.unwrap_or_else(|| cfg.min_interval_secs());
            let report =
                pipeline::embed::embed_all(&db, &project, diarizer.as_ref(), min_interval)?;
            print_report(json_output, &report)?;
        }

        Commands::Cluster { threshold, reconcile } => {
            let threshold = threshold.unwrap_or_else(|| cfg.distance_threshold());
            let outcome = cluster::cluster_and_label(&db, threshold, reconcile)?;
            if json_output {
                json_out::print_json(&outcome)?;
            } else {
                print_cluster_outcome(&outcome);
            }
        }

        Commands::Derive { project } => {
            let project = get_project(&db, &project)?;
            let report = pipeline::derive::derive_all(&db, &project)?;
            print_report(json_output, &report)?;
        }

        Commands::Transcribe {
            project,
            base_url,
            api_key,
            scan_dir,
        } => {
            let project = get_project(&db, &project)?;
            let transcriber = build_transcriber(&cfg, base_url.as_deref(), api_key.as_deref())?;
            let report = if scan_dir {
                let dir = Path::new(&project.root_path).join(FINAL_SEGMENTS_DIR);
                pipeline::transcribe::transcribe_directory(&db, &dir, transcriber.as_ref())?
            } else {
                pipeline::transcribe::transcribe_all(&db, transcriber.as_ref())?
            };
            print_report(json_output, &report)?;
        }

        Commands::Run {
            project,
            length_secs,
            min_interval,
            threshold,
        } => {
            let project = get_project(&db, &project)?;
            // fail fast on a missing diarization setup before any stage runs
            let diarizer = build_diarizer(&cfg, None, None)?;

            let mut reports: Vec<StageReport> = Vec::new();

            reports.push(pipeline::fetch::fetch_all(
                &db,
                &project,
                &DefaultFetcher::new(),
            )?);

            let length = length_secs.unwrap_or_else(|| cfg.segment_length_secs());
            reports.push(pipeline::segment::segment_all(&db, &project, length)?);

            let min_interval = min_interval.unwrap_or_else(|| cfg.min_interval_secs());
            reports.push(pipeline::embed::embed_all(
                &db,
                &project,
                diarizer.as_ref(),
                min_interval,
            )?);

            let threshold = threshold.unwrap_or_else(|| cfg.distance_threshold());
            let outcome = cluster::cluster_and_label(&db, threshold, false)?;

            reports.push(pipeline::derive::derive_all(&db, &project)?);

            // transcription is optional: only runs when a service is configured
            match build_transcriber(&cfg, None, None) {
                Ok(transcriber) => {
                    reports.push(pipeline::transcribe::transcribe_all(&db, transcriber.as_ref())?);
                }
                Err(e) => {
                    eprintln!("Skipping transcription: {e}");
                }
            }

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "stages": reports,
                    "clustering": outcome,
                }))?;
            } else {
                table::print_stage_reports(&reports);
                println!();
                print_cluster_outcome(&outcome);
            }
        }

        Commands::Labels => {
            let labels = db.list_label_counts()?;
            if json_output {
                json_out::print_json(&labels)?;
            } else {
                table::print_label_counts(&labels);
            }
        }

        Commands::Label(cmd) => match cmd {
            LabelCommands::Rename { old, new } => {
                db.rename_label(&old, &new)?;
                println!("Label name updated from '{old}' to '{new}'.");
            }
            LabelCommands::Info { name } => {
                if db.get_label_by_name(&name)?.is_none() {
                    bail!("Label '{name}' does not exist");
                }
                let occurrences = db.label_occurrences(&name)?;
                if json_output {
                    json_out::print_json(&occurrences)?;
                } else {
                    table::print_label_occurrences(&name, &occurrences);
                }
            }
            LabelCommands::Paths { name, segments } => {
                if db.get_label_by_name(&name)?.is_none() {
                    bail!("Label '{name}' does not exist");
                }
                let paths = if segments {
                    db.segment_paths_for_label(&name)?
                } else {
                    db.derived_paths_for_label(&name)?
                };
                if json_output {
                    json_out::print_json(&paths)?;
                } else {
                    table::print_paths(&paths);
                }
            }
        },

        Commands::Stats => {
            let stats = db.stats()?;
            if json_output {
                json_out::print_json(&stats)?;
            } else {
                table::print_stats(&stats);
            }
        }

        Commands::Info => {
            let stats = db.stats()?;
            let schema_ver: String = db
                .conn
                .query_row(
                    "SELECT value FROM voxmap_meta WHERE key = 'schema_version'",
                    [],
                    |r| r.get(0),
                )
                .unwrap_or_else(|_| "unknown".to_string());

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "schema_version": schema_ver,
                    "db_path": db.path.display().to_string(),
                    "db_size_bytes": stats.db_size_bytes,
                    "projects": stats.projects,
                    "embeddings": stats.embeddings,
                    "labels": stats.labels,
                }))?;
            } else {
                println!("voxmap v{}", env!("CARGO_PKG_VERSION"));
                println!("  Schema:     v{schema_ver}");
                println!("  Database:   {}", db.path.display());
                println!("  Size:       {}", format_bytes(stats.db_size_bytes));
                println!("  Projects:   {}", stats.projects);
                println!("  Embeddings: {}", stats.embeddings);
                println!("  Labels:     {}", stats.labels);
            }
        }

        Commands::Config(cmd) => match cmd {
            ConfigCommands::Init => {
                if config::init_config()? {
                    println!("Wrote {}", config::config_path()?.display());
                } else {
                    println!("Config already exists: {}", config::config_path()?.display());
                }
            }
            ConfigCommands::Show => {
                println!("{}", cfg.display_redacted());
            }
        },
    }

    Ok(())
}

fn get_project(db: &Database, name: &str) -> Result<voxmap::db::models::Project> {
    db.get_project(name)?
        .with_context(|| format!("Project not found: {name}. Create it with: voxmap init {name}"))
}

/// Expand glob patterns among local locators; URLs pass through untouched.
fn expand_locators(locators: &[String]) -> Result<Vec<String>> {
    let mut expanded = Vec::new();
    for locator in locators {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            expanded.push(locator.clone());
            continue;
        }
        let path = Path::new(locator);
        if path.exists() {
            expanded.push(
                path.canonicalize()
                    .with_context(|| format!("Failed to resolve path: {locator}"))?
                    .to_string_lossy()
                    .into_owned(),
            );
            continue;
        }
        // Try glob pattern
        let matches: Vec<_> = glob::glob(locator)
            .with_context(|| format!("Invalid path or glob pattern: {locator}"))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        if matches.is_empty() {
            bail!("No files found matching: {locator}");
        }
        for m in matches {
            expanded.push(
                m.canonicalize()?
                    .to_string_lossy()
                    .into_owned(),
            );
        }
    }
    Ok(expanded)
}

fn build_diarizer(
    cfg: &VoxmapConfig,
    base_url: Option<&str>,
    api_key: Option<&str>,
) -> Result<Box<dyn Diarizer>> {
    let service = cfg.service_config("diarization");
    let url = base_url
        .map(str::to_string)
        .or_else(|| service.and_then(|s| s.base_url.clone()))
        .context("No diarization service configured. Set [diarization] base_url in ~/.voxmap/config.toml or pass --base-url")?;
    let key = config::resolve_credential(api_key, "VOXMAP_DIARIZATION_API_KEY", service)?;
    Ok(Box::new(HttpDiarizer::new(url, key)))
}

fn build_transcriber(
    cfg: &VoxmapConfig,
    base_url: Option<&str>,
    api_key: Option<&str>,
) -> Result<Box<dyn Transcriber>> {
    let service = cfg.service_config("transcription");
    let url = base_url
        .map(str::to_string)
        .or_else(|| service.and_then(|s| s.base_url.clone()))
        .context("No transcription service configured. Set [transcription] base_url in ~/.voxmap/config.toml or pass --base-url")?;
    let key = config::resolve_credential(api_key, "VOXMAP_TRANSCRIPTION_API_KEY", service)?;
    Ok(Box::new(HttpTranscriber::new(url, key)))
}

fn print_report(json_output: bool, report: &StageReport) -> Result<()> {
    if json_output {
        json_out::print_json(report)?;
    } else {
        table::print_stage_report(report);
    }
    Ok(())
}

fn print_cluster_outcome(outcome: &cluster::ClusterOutcome) {
    if outcome.embeddings == 0 {
        println!("Nothing to cluster: the store has no embeddings.");
        return;
    }
    println!(
        "Clustered {} embeddings into {} speaker{} ({} new labels, {} new assignments).",
        outcome.embeddings,
        outcome.clusters,
        if outcome.clusters == 1 { "" } else { "s" },
        outcome.labels_created,
        outcome.assignments_added
    );
    if outcome.assignments_preexisting > 0 {
        println!(
            "Note: {} assignments from earlier runs were kept; embeddings may carry \
             labels from several clustering passes. Use --reconcile to start clean.",
            outcome.assignments_preexisting
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
