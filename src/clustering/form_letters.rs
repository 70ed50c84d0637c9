// src/clustering/form_letters.rs

use anyhow::{bail, Result};
use log::{debug, info};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

use crate::models::{ClusterKind, Comment};
use crate::utils::config::{DEFAULT_FORM_LETTER_DISTANCE_THRESHOLD, DEFAULT_FORM_LETTER_MIN_COMMENTS};

#[derive(Debug, Clone)]
pub struct FormLetterConfig {
    /// Clusters at or beyond this average cosine distance are not merged.
    pub distance_threshold: f64,
    /// A cluster is flagged as a form letter when it represents more comments than this.
    pub form_threshold: u64,
}

impl Default for FormLetterConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_FORM_LETTER_DISTANCE_THRESHOLD,
            form_threshold: DEFAULT_FORM_LETTER_MIN_COMMENTS,
        }
    }
}

/// Pairwise cosine distance between rows. Rows with zero norm are at
/// distance 1.0 from everything but themselves.
pub fn cosine_distance_matrix(embeddings: &Array2<f32>) -> Vec<Vec<f64>> {
    let n = embeddings.nrows();
    let norms: Vec<f64> = embeddings
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt())
        .collect();

    let mut distances = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = if norms[i] == 0.0 || norms[j] == 0.0 {
                1.0
            } else {
                let dot: f64 = embeddings
                    .row(i)
                    .iter()
                    .zip(embeddings.row(j).iter())
                    .map(|(&a, &b)| a as f64 * b as f64)
                    .sum();
                (1.0 - dot / (norms[i] * norms[j])).clamp(0.0, 2.0)
            };
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }
    distances
}

/// Average-linkage agglomerative clustering on cosine distance, merging the
/// closest pair while its distance is below `threshold`. Returns one label
/// per row; labels are numbered by each cluster's lowest row index.
pub fn agglomerative_labels(embeddings: &Array2<f32>, threshold: f64) -> Vec<usize> {
    let n = embeddings.nrows();
    let mut distances = cosine_distance_matrix(embeddings);
    // Row i holds the members of cluster i while active[i].
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut active = vec![true; n];
    let mut merges = 0usize;

    loop {
        let mut closest: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                if closest.map_or(true, |(_, _, d)| distances[i][j] < d) {
                    closest = Some((i, j, distances[i][j]));
                }
            }
        }

        let Some((keep, absorb, distance)) = closest else {
            break;
        };
        if distance >= threshold {
            break;
        }

        // Lance-Williams update for average linkage.
        let size_keep = members[keep].len() as f64;
        let size_absorb = members[absorb].len() as f64;
        for k in 0..n {
            if !active[k] || k == keep || k == absorb {
                continue;
            }
            let merged = (size_keep * distances[keep][k] + size_absorb * distances[absorb][k])
                / (size_keep + size_absorb);
            distances[keep][k] = merged;
            distances[k][keep] = merged;
        }
        let absorbed = std::mem::take(&mut members[absorb]);
        members[keep].extend(absorbed);
        active[absorb] = false;
        merges += 1;
    }
    debug!("Agglomerative clustering: {} rows, {} merges", n, merges);

    let mut labels = vec![0usize; n];
    let mut next_label = 0usize;
    for (i, cluster) in members.iter().enumerate() {
        // `keep` is always the lower index, so row i still owns its cluster
        // and clusters are visited in order of their lowest member.
        if !active[i] {
            continue;
        }
        for &row in cluster {
            labels[row] = next_label;
        }
        next_label += 1;
    }
    labels
}

/// Output of one form letter pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormLetterGroups {
    /// One record per cluster, in cluster label order.
    pub records: Vec<Comment>,
    pub cluster_count: usize,
    /// Label of the record each input representative was merged into, in input order.
    pub row_labels: Vec<String>,
}

impl FormLetterGroups {
    /// Record label keyed by the text of every input representative.
    pub fn label_by_text(&self, representatives: &[Comment]) -> HashMap<String, String> {
        representatives
            .iter()
            .zip(&self.row_labels)
            .map(|(rep, label)| (rep.text.clone(), label.clone()))
            .collect()
    }
}

/// Label of a record produced by clustering representatives. Kept apart from
/// the exact-band community labels so the two never name different groups.
pub fn merged_label(label: usize) -> String {
    format!("{}-merged-{}", ClusterKind::FormLetter, label)
}

/// Clusters representative records by embedding to find mass-submitted text.
///
/// Each resulting cluster becomes one record whose `num_represented` sums its
/// members' counts and whose text is drawn uniformly at random from its
/// members. Returns the records, the number of clusters found, and the record
/// label of every input row.
pub fn find_form_letters<R: Rng + ?Sized>(
    representatives: &[Comment],
    embeddings: &Array2<f32>,
    config: &FormLetterConfig,
    rng: &mut R,
) -> Result<FormLetterGroups> {
    if representatives.len() < 2 {
        return Ok(FormLetterGroups::default());
    }
    if embeddings.nrows() != representatives.len() {
        bail!(
            "Form letter detection got {} embeddings for {} comments",
            embeddings.nrows(),
            representatives.len()
        );
    }

    let labels = agglomerative_labels(embeddings, config.distance_threshold);
    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        clusters.entry(label).or_default().push(row);
    }
    let cluster_count = clusters.len();

    let mut records = Vec::with_capacity(cluster_count);
    for (label, rows) in &clusters {
        let Some(&chosen) = rows.choose(rng) else {
            continue;
        };
        let represented: u64 = rows
            .iter()
            .map(|&row| representatives[row].num_represented)
            .sum();
        let is_form_letter = represented > config.form_threshold;
        records.push(representatives[chosen].as_representative(
            merged_label(*label),
            represented,
            is_form_letter,
        ));
    }
    let row_labels: Vec<String> = labels.iter().map(|&label| merged_label(label)).collect();

    info!(
        "Form letter detection: {} representatives -> {} clusters ({} flagged)",
        representatives.len(),
        cluster_count,
        records.iter().filter(|r| r.is_form_letter).count()
    );
    Ok(FormLetterGroups {
        records,
        cluster_count,
        row_labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rep(id: &str, text: &str, represented: u64) -> Comment {
        Comment::new(id, "DOC-1", text).as_representative(
            format!("form-letter-{}", id),
            represented,
            true,
        )
    }

    #[test]
    fn test_fewer_than_two_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = FormLetterConfig::default();
        let empty = Array2::<f32>::zeros((0, 3));
        assert_eq!(
            find_form_letters(&[], &empty, &config, &mut rng).unwrap(),
            FormLetterGroups::default()
        );

        let one = array![[1.0f32, 0.0, 0.0]];
        let reps = vec![rep("a", "Only.", 40)];
        let groups = find_form_letters(&reps, &one, &config, &mut rng).unwrap();
        assert!(groups.records.is_empty());
        assert_eq!(groups.cluster_count, 0);
    }

    #[test]
    fn test_row_mismatch_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let reps = vec![rep("a", "A.", 1), rep("b", "B.", 1)];
        let embeddings = array![[1.0f32, 0.0]];
        assert!(find_form_letters(&reps, &embeddings, &FormLetterConfig::default(), &mut rng).is_err());
    }

    #[test]
    fn test_cosine_distance() {
        let distances = cosine_distance_matrix(&array![[1.0f32, 0.0], [0.0, 2.0], [3.0, 0.0], [0.0, 0.0]]);
        assert!((distances[0][1] - 1.0).abs() < 1e-9);
        assert!(distances[0][2].abs() < 1e-9);
        assert_eq!(distances[3][0], 1.0);
        assert_eq!(distances[2][2], 0.0);
    }

    #[test]
    fn test_average_linkage_threshold() {
        let embeddings = array![
            [1.0f32, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.999, 0.01, 0.0],
            [0.0, 0.999, 0.01],
            [0.0, 0.0, 1.0],
        ];
        assert_eq!(agglomerative_labels(&embeddings, 0.025), vec![0, 1, 0, 1, 2]);
        // Nothing is closer than zero.
        assert_eq!(agglomerative_labels(&embeddings, 0.0), vec![0, 1, 2, 3, 4]);
        // Everything merges under a loose cut.
        assert_eq!(agglomerative_labels(&embeddings, 2.1), vec![0; 5]);
    }

    #[test]
    fn test_counts_sum_and_flag() {
        let reps = vec![
            rep("a", "Save the river.", 6),
            rep("b", "Unrelated point.", 3),
            rep("c", "Save the river!", 7),
        ];
        let embeddings = array![[1.0f32, 0.0], [0.0, 1.0], [0.9999, 0.001]];
        let mut rng = StdRng::seed_from_u64(42);
        let groups =
            find_form_letters(&reps, &embeddings, &FormLetterConfig::default(), &mut rng).unwrap();
        let records = &groups.records;

        assert_eq!(groups.cluster_count, 2);
        assert_eq!(records.len(), 2);
        let river = &records[0];
        assert_eq!(river.num_represented, 13);
        assert!(river.is_form_letter);
        assert!(["a", "c"].contains(&river.id.as_str()));
        assert!(["Save the river.", "Save the river!"].contains(&river.text.as_str()));
        assert_eq!(river.cluster_id.as_deref(), Some("form-letter-merged-0"));
        assert_eq!(
            groups.row_labels,
            vec!["form-letter-merged-0", "form-letter-merged-1", "form-letter-merged-0"]
        );
        let by_text = groups.label_by_text(&reps);
        assert_eq!(by_text["Save the river!"], "form-letter-merged-0");
        assert_eq!(by_text["Unrelated point."], "form-letter-merged-1");

        let other = &records[1];
        assert_eq!(other.id, "b");
        assert_eq!(other.num_represented, 3);
        assert!(!other.is_form_letter);
    }

    #[test]
    fn test_threshold_is_strict() {
        let reps = vec![rep("a", "Same.", 5), rep("b", "Same.", 5)];
        let embeddings = array![[1.0f32, 1.0], [1.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(3);
        let groups =
            find_form_letters(&reps, &embeddings, &FormLetterConfig::default(), &mut rng).unwrap();
        assert_eq!(groups.cluster_count, 1);
        assert_eq!(groups.records[0].num_represented, 10);
        assert!(!groups.records[0].is_form_letter);
    }
}
