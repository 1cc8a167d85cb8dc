use unicode_width::UnicodeWidthStr;

use crate::db::models::*;
use crate::pipeline::StageReport;

/// Format duration in seconds to human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// One line per stage, with per-artifact failure reasons underneath.
pub fn print_stage_reports(reports: &[StageReport]) {
    println!(
        "  {:<12} {:>9} {:>8} {:>7} {:>8}",
        "STAGE", "PROCESSED", "SKIPPED", "FAILED", "TIME"
    );
    println!("  {}", "-".repeat(49));

    for r in reports {
        println!(
            "  {:<12} {:>9} {:>8} {:>7} {:>7.1}s",
            r.stage, r.processed, r.skipped, r.failed, r.duration_secs
        );
    }

    let failures: Vec<_> = reports.iter().flat_map(|r| &r.failures).collect();
    if !failures.is_empty() {
        println!("\nFailures:");
        for f in failures {
            println!("  {} — {}", truncate(&f.item, 48), f.reason);
        }
    }
}

pub fn print_stage_report(report: &StageReport) {
    print_stage_reports(std::slice::from_ref(report));
}

pub fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects yet. Create one with: voxmap init <name>");
        return;
    }
    println!("  {:<24} {:<12} ROOT", "PROJECT", "CREATED");
    println!("  {}", "-".repeat(60));
    for p in projects {
        println!(
            "  {:<24} {:<12} {}",
            truncate(&p.project_name, 24),
            &p.created_at[..10.min(p.created_at.len())],
            p.root_path
        );
    }
}

pub fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        println!("No sources registered for this project.");
        return;
    }
    println!("  {:<5} {:<34} {:<24} AUTHOR", "ID", "LOCATOR", "TITLE");
    println!("  {}", "-".repeat(78));
    for s in sources {
        println!(
            "  {:<5} {:<34} {:<24} {}",
            s.source_id,
            truncate(&s.locator, 34),
            truncate(&s.title, 24),
            truncate(&s.author, 16)
        );
    }
}

pub fn print_audio_files(files: &[AudioFile]) {
    if files.is_empty() {
        println!("No audio acquired for this project yet. Run: voxmap fetch <project>");
        return;
    }
    println!("  {:<5} {:<6} {:<28} {:>9} PATH", "ID", "SOURCE", "FILE", "DURATION");
    println!("  {}", "-".repeat(78));
    for f in files {
        let duration = f
            .duration_seconds
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {:<5} {:<6} {:<28} {:>9} {}",
            f.audio_id,
            f.source_id,
            truncate(&f.file_name, 28),
            duration,
            truncate(&f.file_path, 40)
        );
    }
}

pub fn print_label_counts(labels: &[LabelCount]) {
    if labels.is_empty() {
        println!("No labels found. Run: voxmap cluster");
        return;
    }
    println!("Existing labels:");
    for l in labels {
        println!(
            "  {} (embeddings: {})",
            l.label_name, l.embeddings
        );
    }
}

pub fn print_label_occurrences(label_name: &str, occurrences: &[LabelOccurrence]) {
    if occurrences.is_empty() {
        println!("No timestamps found for label '{label_name}'.");
        return;
    }
    println!("Occurrences of '{label_name}':\n");
    println!(
        "  {:<32} {:>6} {:>8} {:>9} {:>9} {:>9}",
        "TITLE", "AUDIO", "SEGMENT", "INTERVAL", "START", "END"
    );
    println!("  {}", "-".repeat(79));
    for o in occurrences {
        println!(
            "  {:<32} {:>6} {:>8} {:>9} {:>8.2}s {:>8.2}s",
            truncate(&o.title, 32),
            o.audio_id,
            o.segment_id,
            o.interval_id,
            o.start_seconds,
            o.end_seconds
        );
    }
}

pub fn print_paths(paths: &[String]) {
    if paths.is_empty() {
        println!("No audio files found for this label.");
        return;
    }
    for p in paths {
        println!("{p}");
    }
}

pub fn print_stats(stats: &DbStats) {
    println!("Store contents:");
    println!("  Projects:          {}", stats.projects);
    println!("  Sources:           {}", stats.sources);
    println!("  Audio files:       {}", stats.audio_files);
    println!("  Segments:          {}", stats.segments);
    println!("  Embeddings:        {}", stats.embeddings);
    println!("  Speech intervals:  {}", stats.speech_intervals);
    println!("  Labels:            {}", stats.labels);
    println!("  Label assignments: {}", stats.label_assignments);
    println!("  Derived segments:  {}", stats.derived_segments);
    println!("  Transcripts:       {}", stats.transcripts);
}
