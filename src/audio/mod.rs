use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::path::Path;

/// Probe a WAV file's duration in seconds.
pub fn wav_duration_seconds(path: &Path) -> Result<f64> {
    let reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV: {}", path.display()))?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Copy the [start_ms, end_ms) window of a WAV file into a new WAV file
/// with the same spec. Bounds past the end of the input are clamped.
pub fn slice_wav(input: &Path, start_ms: u64, end_ms: u64, output: &Path) -> Result<()> {
    let mut reader = WavReader::open(input)
        .with_context(|| format!("Failed to open WAV: {}", input.display()))?;
    let spec = reader.spec();
    let total_frames = reader.duration() as u64;

    let ms_to_frame = |ms: u64| (ms * spec.sample_rate as u64 / 1000).min(total_frames);
    let start_frame = ms_to_frame(start_ms);
    let end_frame = ms_to_frame(end_ms);
    if end_frame <= start_frame {
        bail!(
            "Empty slice {start_ms}..{end_ms}ms of {} ({}s long)",
            input.display(),
            total_frames as f64 / spec.sample_rate as f64
        );
    }

    reader
        .seek(start_frame as u32)
        .with_context(|| format!("Failed to seek in {}", input.display()))?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut writer = WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create WAV: {}", output.display()))?;

    let sample_count = ((end_frame - start_frame) * spec.channels as u64) as usize;
    match spec.sample_format {
        SampleFormat::Float => {
            for sample in reader.samples::<f32>().take(sample_count) {
                writer.write_sample(sample?)?;
            }
        }
        SampleFormat::Int => {
            for sample in reader.samples::<i32>().take(sample_count) {
                writer.write_sample(sample?)?;
            }
        }
    }

    writer
        .finalize()
        .with_context(|| format!("Failed to finalize WAV: {}", output.display()))?;
    Ok(())
}

/// Test fixture: a mono 16-bit WAV whose sample values are their frame index.
#[cfg(test)]
pub(crate) fn write_ramp_wav(path: &Path, sample_rate: u32, frames: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i % 30000) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn duration_probe() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_ramp_wav(&path, 8000, 8000 * 3);
        assert!((wav_duration_seconds(&path).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn slice_extracts_exact_window() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_ramp_wav(&input, 1000, 5000); // 5s at 1kHz, sample value == frame index

        slice_wav(&input, 1500, 3500, &output).unwrap();

        let mut reader = WavReader::open(&output).unwrap();
        assert_eq!(reader.duration(), 2000);
        let first = reader.samples::<i16>().next().unwrap().unwrap();
        assert_eq!(first, 1500);
    }

    #[test]
    fn slice_clamps_past_end() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_ramp_wav(&input, 1000, 2000);

        slice_wav(&input, 1000, 10_000, &output).unwrap();
        let reader = WavReader::open(&output).unwrap();
        assert_eq!(reader.duration(), 1000);
    }

    #[test]
    fn slice_rejects_empty_window() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_ramp_wav(&input, 1000, 2000);
        assert!(slice_wav(&input, 3000, 4000, &dir.path().join("out.wav")).is_err());
    }
}
