use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,
    pub project_name: String,
    pub description: String,
    pub root_path: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: i64,
    pub project_id: i64,
    pub locator: String,
    pub title: String,
    pub author: String,
    pub views: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFile {
    pub audio_id: i64,
    pub project_id: i64,
    pub source_id: i64,
    pub file_name: String,
    pub folder_path: String,
    pub file_path: String,
    pub duration_seconds: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: i64,
    pub audio_id: i64,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub duration_seconds: f64,
    pub file_path: String,
    pub created_at: String,
}

/// An embedding row with its vector already decoded.
#[derive(Debug, Clone)]
pub struct EmbeddingVector {
    pub embedding_id: i64,
    pub segment_id: i64,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechInterval {
    pub interval_id: i64,
    pub embedding_id: i64,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub label_id: i64,
    pub label_name: String,
    pub created_at: String,
}

/// Label listing entry with its assignment count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelCount {
    pub label_id: i64,
    pub label_name: String,
    pub embeddings: i64,
}

/// One row of `label info`: where a labeled speaker was heard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelOccurrence {
    pub title: String,
    pub audio_id: i64,
    pub segment_id: i64,
    pub interval_id: i64,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// A speech interval joined up to its parent segment, as consumed by the
/// derived-segment materializer.
#[derive(Debug, Clone)]
pub struct IntervalSlice {
    pub interval_id: i64,
    pub embedding_id: i64,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub segment_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedSegment {
    pub derived_id: i64,
    pub interval_id: i64,
    pub label_id: Option<i64>,
    pub file_path: String,
    pub created_at: String,
}

/// Stats returned by `voxmap stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub projects: i64,
    pub sources: i64,
    pub audio_files: i64,
    pub segments: i64,
    pub embeddings: i64,
    pub speech_intervals: i64,
    pub labels: i64,
    pub label_assignments: i64,
    pub derived_segments: i64,
    pub transcripts: i64,
    pub db_size_bytes: u64,
}

/// Serialize an embedding vector as a raw little-endian f32 array.
/// No length header is stored; the dimensionality is fixed by the model.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a raw little-endian f32 blob back into a vector.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        bail!(
            "embedding blob length {} is not a multiple of 4 bytes",
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_roundtrip_is_little_endian() {
        let v = vec![0.0f32, -1.5, 3.25];
        let bytes = encode_vector(&v);
        assert_eq!(bytes.len(), 12);
        // -1.5f32 == 0xBFC00000, little-endian on the wire
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0xC0, 0xBF]);
        assert_eq!(decode_vector(&bytes).unwrap(), v);
    }

    #[test]
    fn decode_rejects_truncated_blob() {
        assert!(decode_vector(&[0u8, 1, 2]).is_err());
    }

    #[test]
    fn decode_empty_blob() {
        assert!(decode_vector(&[]).unwrap().is_empty());
    }
}
