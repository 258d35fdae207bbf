//! Text-column detection from line start positions.
//!
//! Column starts are found by clustering the left edges of line-leading
//! boxes with a one-dimensional k-means, trying up to [`MAX_COLUMNS`]
//! clusters and keeping the count with the best silhouette.

/// Most columns considered on one page.
pub const MAX_COLUMNS: usize = 4;
/// Starts closer than this fraction of the text width to the leftmost start
/// are treated as indents of the first column while choosing the count.
const INDENT_TOLERANCE: f32 = 0.12;
/// Every column must hold at least this share of the line starts.
const MIN_COLUMN_SHARE: f32 = 0.2;
const KMEANS_MAX_ITERATIONS: usize = 50;

/// Lloyd's k-means over scalars, seeded at evenly spaced quantiles.
///
/// Returns one label per value and the `k` centres. Empty clusters keep their
/// seed; ties go to the lower label.
pub fn kmeans_1d(values: &[f32], k: usize) -> (Vec<usize>, Vec<f32>) {
    if values.is_empty() || k == 0 {
        return (vec![0; values.len()], Vec::new());
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let last = sorted.len() - 1;
    let mut centres: Vec<f32> = (0..k)
        .map(|i| if k == 1 { sorted[last / 2] } else { sorted[i * last / (k - 1)] })
        .collect();

    let nearest = |v: f32, centres: &[f32]| -> usize {
        let mut best = 0;
        for (i, c) in centres.iter().enumerate() {
            if (v - c).abs() < (v - centres[best]).abs() {
                best = i;
            }
        }
        best
    };

    let mut labels: Vec<usize> = values.iter().map(|&v| nearest(v, &centres)).collect();
    for _ in 0..KMEANS_MAX_ITERATIONS {
        for (i, centre) in centres.iter_mut().enumerate() {
            let members: Vec<f32> = values
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == i)
                .map(|(v, _)| *v)
                .collect();
            if !members.is_empty() {
                *centre = members.iter().sum::<f32>() / members.len() as f32;
            }
        }
        let next: Vec<usize> = values.iter().map(|&v| nearest(v, &centres)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }
    (labels, centres)
}

/// Mean silhouette of a labelling over scalars.
///
/// `None` unless there are at least two clusters and fewer clusters than
/// values. Members of singleton clusters score 0.
pub fn silhouette_1d(values: &[f32], labels: &[usize]) -> Option<f32> {
    let mut clusters: Vec<usize> = labels.to_vec();
    clusters.sort_unstable();
    clusters.dedup();
    if clusters.len() < 2 || clusters.len() >= values.len() {
        return None;
    }

    let mean_distance = |i: usize, cluster: usize| -> Option<f32> {
        let distances: Vec<f32> = values
            .iter()
            .zip(labels)
            .enumerate()
            .filter(|(j, (_, l))| *j != i && **l == cluster)
            .map(|(_, (v, _))| (v - values[i]).abs())
            .collect();
        (!distances.is_empty()).then(|| distances.iter().sum::<f32>() / distances.len() as f32)
    };

    let total: f32 = (0..values.len())
        .map(|i| {
            let Some(a) = mean_distance(i, labels[i]) else {
                return 0.0;
            };
            let b = clusters
                .iter()
                .filter(|&&c| c != labels[i])
                .filter_map(|&c| mean_distance(i, c))
                .fold(f32::INFINITY, f32::min);
            let scale = a.max(b);
            if scale > 0.0 { (b - a) / scale } else { 0.0 }
        })
        .sum();
    Some(total / values.len() as f32)
}

/// Left edges of the text columns, ascending.
///
/// `starts` are the left edges of line-leading boxes and `width` the extent
/// of the page's text. A single column is assumed when no split scores a
/// positive silhouette with every column holding enough starts.
pub fn column_starts(starts: &[f32], width: f32) -> Vec<f32> {
    let Some(leftmost) = starts.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let tolerance = width * INDENT_TOLERANCE;
    let snapped: Vec<f32> = starts
        .iter()
        .map(|&x| if (x - leftmost).abs() < tolerance { leftmost } else { x })
        .collect();
    let min_members = ((starts.len() as f32 * MIN_COLUMN_SHARE).ceil() as usize).max(2);

    let mut best_k = 1;
    let mut best_score = -1.0f32;
    for k in 1..=MAX_COLUMNS.min(starts.len()) {
        let score = if k == 1 {
            0.0
        } else {
            let (labels, _) = kmeans_1d(&snapped, k);
            let too_small = (0..k).any(|c| {
                let n = labels.iter().filter(|&&l| l == c).count();
                n > 0 && n < min_members
            });
            if too_small {
                continue;
            }
            match silhouette_1d(&snapped, &labels) {
                Some(score) => score,
                None => continue,
            }
        };
        if score > best_score {
            best_score = score;
            best_k = k;
        }
    }
    if best_k == 1 {
        return vec![leftmost];
    }

    let (labels, _) = kmeans_1d(starts, best_k);
    let mut edges: Vec<f32> = (0..best_k)
        .filter_map(|c| {
            starts
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == c)
                .map(|(x, _)| *x)
                .reduce(f32::min)
        })
        .collect();
    edges.sort_by(|a, b| a.total_cmp(b));
    edges
}

/// Index of the rightmost column starting at or before `x0`.
pub fn column_of(x0: f32, edges: &[f32], slack: f32) -> usize {
    edges
        .iter()
        .rposition(|&edge| edge <= x0 + slack)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_separates_two_groups() {
        let values = [50.0, 52.0, 320.0, 51.0, 318.0];
        let (labels, centres) = kmeans_1d(&values, 2);
        assert_eq!(labels, vec![0, 0, 1, 0, 1]);
        assert!((centres[0] - 51.0).abs() < 1e-4, "centres: {:?}", centres);
        assert!((centres[1] - 319.0).abs() < 1e-4, "centres: {:?}", centres);
    }

    #[test]
    fn test_kmeans_identical_values_share_one_label() {
        let (labels, _) = kmeans_1d(&[10.0, 10.0, 10.0], 3);
        assert!(labels.iter().all(|&l| l == labels[0]));
        assert_eq!(silhouette_1d(&[10.0, 10.0, 10.0], &labels), None);
    }

    #[test]
    fn test_silhouette_of_separated_clusters() {
        let score = silhouette_1d(&[0.0, 0.0, 100.0, 100.0], &[0, 0, 1, 1]).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
        // As many clusters as values
        assert_eq!(silhouette_1d(&[0.0, 1.0], &[0, 1]), None);
    }

    #[test]
    fn test_two_column_starts() {
        let starts = [50.0, 50.0, 50.0, 320.0, 320.0, 322.0, 55.0];
        assert_eq!(column_starts(&starts, 500.0), vec![50.0, 320.0]);
    }

    #[test]
    fn test_lone_outlier_is_not_a_column() {
        let starts = [10.0, 10.0, 12.0, 10.0, 10.0, 250.0];
        assert_eq!(column_starts(&starts, 280.0), vec![10.0]);
        assert!(column_starts(&[], 100.0).is_empty());
    }

    #[test]
    fn test_column_of_uses_rightmost_start() {
        let edges = [50.0, 320.0];
        assert_eq!(column_of(50.0, &edges, 1.0), 0);
        assert_eq!(column_of(200.0, &edges, 1.0), 0);
        assert_eq!(column_of(319.5, &edges, 1.0), 1);
        assert_eq!(column_of(10.0, &edges, 1.0), 0);
    }
}
