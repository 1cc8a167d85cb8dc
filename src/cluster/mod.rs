//! Identity resolution: group every embedding in the store into speaker
//! clusters and maintain the name-to-cluster mapping.
//!
//! Clustering is hierarchical agglomerative with Ward (minimum-variance)
//! linkage on Euclidean distance, cut by a caller-supplied distance
//! threshold rather than a fixed cluster count. Ward linkage keeps
//! within-cluster variance minimal, which suits fixed-dimensional
//! continuous voice embeddings where the speaker count is unknown.

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::Database;

/// Outcome of one clustering run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterOutcome {
    pub embeddings: usize,
    pub clusters: usize,
    pub labels_created: usize,
    pub assignments_added: usize,
    /// Assignment rows that already existed before this run. Labels only
    /// accumulate across runs; a nonzero value after a re-cluster means
    /// some embeddings may now carry labels from older runs too.
    pub assignments_preexisting: i64,
}

/// Flat Ward clustering: returns one cluster id per input vector.
///
/// Ids are 1-based and numbered by first appearance in input order, so the
/// partition is deterministic for a fixed input. Any two vectors whose
/// dendrogram merge height is at or below `distance_threshold` share an id.
pub fn ward_clusters(vectors: &[Vec<f32>], distance_threshold: f64) -> Result<Vec<usize>> {
    let n = vectors.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let dim = vectors[0].len();
    if dim == 0 {
        bail!("Cannot cluster zero-dimensional vectors");
    }
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dim {
            bail!(
                "Embedding vector {i} has dimension {} but expected {dim}",
                v.len()
            );
        }
    }

    // Each point starts as its own cluster. `slot[p]` is the active cluster a
    // point currently belongs to; `size[c]` is 0 for retired clusters.
    let mut slot: Vec<usize> = (0..n).collect();
    let mut size: Vec<f64> = vec![1.0; n];

    // Squared Euclidean distances between active clusters.
    let mut dist2 = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d2: f64 = vectors[i]
                .iter()
                .zip(&vectors[j])
                .map(|(a, b)| {
                    let d = *a as f64 - *b as f64;
                    d * d
                })
                .sum();
            dist2[i * n + j] = d2;
            dist2[j * n + i] = d2;
        }
    }

    let threshold2 = distance_threshold * distance_threshold;
    let mut active = n;

    // Greedy nearest-pair merging. Ward heights are monotone, so stopping at
    // the first merge above the threshold yields the same partition as
    // cutting the full dendrogram at that height.
    while active > 1 {
        let mut best = (0usize, 0usize);
        let mut best_d2 = f64::INFINITY;
        for i in 0..n {
            if size[i] == 0.0 {
                continue;
            }
            for j in (i + 1)..n {
                if size[j] == 0.0 {
                    continue;
                }
                if dist2[i * n + j] < best_d2 {
                    best_d2 = dist2[i * n + j];
                    best = (i, j);
                }
            }
        }

        if best_d2 > threshold2 {
            break;
        }

        let (i, j) = best;
        let (ni, nj) = (size[i], size[j]);
        debug!("merging clusters {i} and {j} at distance {:.4}", best_d2.sqrt());

        // Lance-Williams update for Ward linkage.
        for k in 0..n {
            if size[k] == 0.0 || k == i || k == j {
                continue;
            }
            let nk = size[k];
            let d2 = ((ni + nk) * dist2[i * n + k] + (nj + nk) * dist2[j * n + k]
                - nk * dist2[i * n + j])
                / (ni + nj + nk);
            dist2[i * n + k] = d2;
            dist2[k * n + i] = d2;
        }

        size[i] = ni + nj;
        size[j] = 0.0;
        for s in slot.iter_mut() {
            if *s == j {
                *s = i;
            }
        }
        active -= 1;
    }

    // Renumber to 1-based ids in order of first appearance.
    let mut next_id = 0usize;
    let mut id_of_slot = vec![0usize; n];
    let mut assignments = Vec::with_capacity(n);
    for &s in &slot {
        if id_of_slot[s] == 0 {
            next_id += 1;
            id_of_slot[s] = next_id;
        }
        assignments.push(id_of_slot[s]);
    }
    Ok(assignments)
}

/// Look up a label id by exact name within the current transaction.
fn find_label(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT label_id FROM labels WHERE label_name = ?1", [name], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(id)
}

fn assignment_exists(conn: &Connection, embedding_id: i64, label_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM embedding_labels WHERE embedding_id = ?1 AND label_id = ?2",
        [embedding_id, label_id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Cluster every embedding in the store and persist label assignments.
///
/// The whole run is one transaction: either every assignment lands or none
/// does. Existing assignment rows are never touched unless `reconcile` is
/// set, which clears all embedding-label rows (never label names) first.
pub fn cluster_and_label(
    db: &Database,
    distance_threshold: f64,
    reconcile: bool,
) -> Result<ClusterOutcome> {
    let rows = db.all_embedding_vectors()?;
    if rows.is_empty() {
        info!("No embeddings in the store; nothing to cluster");
        return Ok(ClusterOutcome::default());
    }

    let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.vector.clone()).collect();
    let assignments = ward_clusters(&vectors, distance_threshold)
        .context("Clustering failed; no labels were changed")?;
    let cluster_count = assignments.iter().copied().max().unwrap_or(0);

    let preexisting = db.count_label_assignments()?;
    let tx = db.conn.unchecked_transaction()?;

    if reconcile {
        let cleared = tx.execute("DELETE FROM embedding_labels", [])?;
        info!("Reconcile: cleared {cleared} existing label assignments");
    }

    // Resolve "Speaker {n}" label rows, creating the missing ones.
    let mut labels_created = 0usize;
    let mut label_ids = vec![0i64; cluster_count + 1];
    for cluster in 1..=cluster_count {
        let name = format!("Speaker {cluster}");
        label_ids[cluster] = match find_label(&tx, &name)? {
            Some(id) => id,
            None => {
                tx.execute("INSERT INTO labels (label_name) VALUES (?1)", [&name])?;
                labels_created += 1;
                tx.last_insert_rowid()
            }
        };
    }

    let mut assignments_added = 0usize;
    for (row, &cluster) in rows.iter().zip(&assignments) {
        let label_id = label_ids[cluster];
        if !assignment_exists(&tx, row.embedding_id, label_id)? {
            tx.execute(
                "INSERT INTO embedding_labels (embedding_id, label_id) VALUES (?1, ?2)",
                [row.embedding_id, label_id],
            )?;
            assignments_added += 1;
        }
    }

    tx.commit().context("Failed to commit clustering run")?;

    info!(
        "Clustered {} embeddings into {} speakers ({} new labels, {} new assignments)",
        rows.len(),
        cluster_count,
        labels_created,
        assignments_added
    );

    Ok(ClusterOutcome {
        embeddings: rows.len(),
        clusters: cluster_count,
        labels_created,
        assignments_added,
        assignments_preexisting: if reconcile { 0 } else { preexisting },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::encode_vector;
    use tempfile::tempdir;

    /// Compare two assignments as partitions, ignoring id numbering.
    fn same_partition(a: &[usize], b: &[usize]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        for i in 0..a.len() {
            for j in (i + 1)..a.len() {
                if (a[i] == a[j]) != (b[i] == b[j]) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn empty_input_is_noop() {
        assert!(ward_clusters(&[], 1.0).unwrap().is_empty());
    }

    #[test]
    fn single_vector_is_speaker_one() {
        let clusters = ward_clusters(&[vec![0.3, 0.7]], 1.0).unwrap();
        assert_eq!(clusters, vec![1]);
    }

    #[test]
    fn near_vectors_merge_far_vectors_do_not() {
        // A and B are 0.1 apart, C is far from both.
        let vectors = vec![vec![0.0, 0.0], vec![0.0, 0.1], vec![5.0, 5.0]];
        let clusters = ward_clusters(&vectors, 1.0).unwrap();
        assert_eq!(clusters[0], clusters[1]);
        assert_ne!(clusters[0], clusters[2]);
        assert_eq!(*clusters.iter().max().unwrap(), 2);
    }

    #[test]
    fn identical_vectors_share_a_cluster() {
        let v = vec![1.5f32, -2.0, 0.25];
        let clusters = ward_clusters(&[v.clone(), v.clone(), v], 0.5).unwrap();
        assert_eq!(clusters, vec![1, 1, 1]);
    }

    #[test]
    fn mismatched_dimensions_rejected() {
        assert!(ward_clusters(&[vec![1.0, 2.0], vec![1.0]], 1.0).is_err());
    }

    #[test]
    fn repartition_is_deterministic() {
        let vectors: Vec<Vec<f32>> = (0..12)
            .map(|i| vec![(i as f32 * 0.37).sin(), (i as f32 * 0.91).cos()])
            .collect();
        let a = ward_clusters(&vectors, 0.8).unwrap();
        let b = ward_clusters(&vectors, 0.8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn raising_threshold_never_adds_clusters() {
        let vectors: Vec<Vec<f32>> = (0..10)
            .map(|i| vec![(i as f32).sin() * 3.0, (i as f32 * 0.5).cos() * 3.0])
            .collect();
        let mut previous = usize::MAX;
        for threshold in [0.1, 0.5, 1.0, 2.0, 4.0, 8.0] {
            let clusters = ward_clusters(&vectors, threshold).unwrap();
            let count = *clusters.iter().max().unwrap();
            assert!(
                count <= previous,
                "threshold {threshold} produced {count} clusters, more than {previous}"
            );
            previous = count;
        }
    }

    #[test]
    fn partitions_nest_as_threshold_grows() {
        let vectors: Vec<Vec<f32>> = (0..8)
            .map(|i| vec![i as f32 * 0.6, (i % 3) as f32])
            .collect();
        let fine = ward_clusters(&vectors, 0.7).unwrap();
        let coarse = ward_clusters(&vectors, 3.0).unwrap();
        // anything merged at the fine threshold stays merged at the coarse one
        for i in 0..vectors.len() {
            for j in (i + 1)..vectors.len() {
                if fine[i] == fine[j] {
                    assert_eq!(coarse[i], coarse[j]);
                }
            }
        }
    }

    fn seed_embeddings(db: &Database, dir: &std::path::Path, vectors: &[Vec<f32>]) {
        let p = db.create_or_get_project("p", dir).unwrap();
        let src = db.insert_source(p.project_id, "x", "", "", None).unwrap();
        let audio = db
            .insert_audio_file(p.project_id, src, "a.wav", "/tmp", "/tmp/a.wav", Some(60.0))
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO segments (audio_id, start_seconds, end_seconds, duration_seconds, file_path)
                 VALUES (?1, 0, 60, 60, '/tmp/seg.wav')",
                [audio],
            )
            .unwrap();
        let seg_id = db.conn.last_insert_rowid();
        for v in vectors {
            db.conn
                .execute(
                    "INSERT INTO embeddings (segment_id, vector) VALUES (?1, ?2)",
                    rusqlite::params![seg_id, encode_vector(v)],
                )
                .unwrap();
        }
    }

    #[test]
    fn labeling_two_voices_three_embeddings() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        seed_embeddings(
            &db,
            dir.path(),
            &[vec![0.0, 0.0], vec![0.0, 0.1], vec![5.0, 5.0]],
        );

        let outcome = cluster_and_label(&db, 1.0, false).unwrap();
        assert_eq!(outcome.embeddings, 3);
        assert_eq!(outcome.clusters, 2);
        assert_eq!(outcome.labels_created, 2);
        assert_eq!(outcome.assignments_added, 3);

        let labels = db.list_label_counts().unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().any(|l| l.label_name == "Speaker 1"));
        assert!(labels.iter().any(|l| l.label_name == "Speaker 2"));
        assert_eq!(db.count_label_assignments().unwrap(), 3);
    }

    #[test]
    fn relabeling_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        seed_embeddings(
            &db,
            dir.path(),
            &[vec![0.0, 0.0], vec![0.0, 0.1], vec![5.0, 5.0]],
        );

        cluster_and_label(&db, 1.0, false).unwrap();
        let second = cluster_and_label(&db, 1.0, false).unwrap();

        // same partition, nothing new created
        assert_eq!(second.labels_created, 0);
        assert_eq!(second.assignments_added, 0);
        assert_eq!(db.list_label_counts().unwrap().len(), 2);
        assert_eq!(db.count_label_assignments().unwrap(), 3);
    }

    #[test]
    fn reconcile_clears_assignments_not_labels() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        seed_embeddings(
            &db,
            dir.path(),
            &[vec![0.0, 0.0], vec![0.0, 0.1], vec![5.0, 5.0]],
        );

        cluster_and_label(&db, 1.0, false).unwrap();
        // a coarser threshold folds everyone into one cluster
        let outcome = cluster_and_label(&db, 100.0, true).unwrap();

        assert_eq!(outcome.clusters, 1);
        assert_eq!(db.count_label_assignments().unwrap(), 3);
        // "Speaker 2" survives reconciliation even with no remaining references
        assert!(db.get_label_by_name("Speaker 2").unwrap().is_some());
        let counts = db.list_label_counts().unwrap();
        let s2 = counts.iter().find(|l| l.label_name == "Speaker 2").unwrap();
        assert_eq!(s2.embeddings, 0);
    }

    #[test]
    fn empty_store_clusters_to_nothing() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        let outcome = cluster_and_label(&db, 1.0, false).unwrap();
        assert_eq!(outcome.embeddings, 0);
        assert_eq!(outcome.clusters, 0);
    }

    #[test]
    fn accumulation_without_reconcile() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("t.db")).unwrap();
        seed_embeddings(&db, dir.path(), &[vec![0.0, 0.0], vec![6.0, 6.0]]);

        cluster_and_label(&db, 1.0, false).unwrap(); // two clusters
        cluster_and_label(&db, 100.0, false).unwrap(); // one cluster, no cleanup

        // the second embedding now carries both its old and new label
        assert_eq!(db.count_label_assignments().unwrap(), 3);
    }

    #[test]
    fn partition_helper_sanity() {
        assert!(same_partition(&[1, 1, 2], &[2, 2, 1]));
        assert!(!same_partition(&[1, 1, 2], &[1, 2, 2]));
    }
}
