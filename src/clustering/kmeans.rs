//! Lloyd's k-means over cosine distance
//!
//! Deterministic by construction: centroids seed from evenly spaced points
//! in input order, equidistant points go to the lower-indexed centroid, and
//! emptied centroids re-seed from the point farthest from its own centroid.
//! Repeated runs over identical input produce identical partitions.

use crate::embedding::cosine_distance;

/// Output of one k-means run
#[derive(Debug)]
pub(crate) struct Partition {
    /// Final centroids, one per requested cluster
    pub centroids: Vec<Vec<f32>>,
    /// Cluster index assigned to each input point
    pub assignments: Vec<usize>,
    /// Iterations actually executed
    pub iterations: usize,
}

/// Run Lloyd's iteration until assignments stabilize or the cap is reached.
///
/// No convergence is asserted beyond the cap; the partition at cap is
/// returned as-is. Callers guarantee `1 <= k <= points.len()` and that all
/// points share one dimensionality.
pub(crate) fn lloyd(points: &[Vec<f32>], k: usize, max_iterations: usize) -> Partition {
    debug_assert!(k >= 1 && k <= points.len());

    let mut centroids = seed_centroids(points, k);
    let mut assignments = assign(points, &centroids);
    reseed_empty(points, &mut centroids, &mut assignments, k);

    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;

        recompute_centroids(points, &assignments, &mut centroids);

        let mut next = assign(points, &centroids);
        reseed_empty(points, &mut centroids, &mut next, k);

        if next == assignments {
            break;
        }
        assignments = next;
    }

    Partition {
        centroids,
        assignments,
        iterations,
    }
}

/// Seed centroids from evenly spaced input points. Indices are strictly
/// increasing for k <= n, so initial centroids are distinct positions.
fn seed_centroids(points: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let n = points.len();
    (0..k).map(|i| points[i * n / k].clone()).collect()
}

/// Assign each point to its nearest centroid; strict comparison keeps the
/// lower-indexed centroid on ties.
fn assign(points: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
    points
        .iter()
        .map(|point| {
            let mut best = 0;
            let mut best_dist = cosine_distance(point, &centroids[0]);
            for (idx, centroid) in centroids.iter().enumerate().skip(1) {
                let dist = cosine_distance(point, centroid);
                if dist < best_dist {
                    best = idx;
                    best_dist = dist;
                }
            }
            best
        })
        .collect()
}

/// Re-seed any emptied centroid to the point currently farthest from its own
/// assigned centroid, then re-run assignment. Bounded at k attempts; with
/// duplicate input points a centroid can stay empty, and the engine drops
/// empty clusters from the output.
fn reseed_empty(
    points: &[Vec<f32>],
    centroids: &mut [Vec<f32>],
    assignments: &mut Vec<usize>,
    k: usize,
) {
    for _ in 0..k {
        let mut counts = vec![0usize; k];
        for &a in assignments.iter() {
            counts[a] += 1;
        }

        let Some(empty) = counts.iter().position(|&c| c == 0) else {
            return;
        };

        let mut farthest = 0;
        let mut farthest_dist = f32::MIN;
        for (idx, point) in points.iter().enumerate() {
            let dist = cosine_distance(point, &centroids[assignments[idx]]);
            if dist > farthest_dist {
                farthest = idx;
                farthest_dist = dist;
            }
        }

        centroids[empty] = points[farthest].clone();
        *assignments = assign(points, centroids);
    }
}

/// Recompute each centroid as the mean of its assigned points. Centroids
/// with no members are left in place; reseeding handles them.
fn recompute_centroids(points: &[Vec<f32>], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let dims = points[0].len();
    let k = centroids.len();
    let mut sums = vec![vec![0.0f32; dims]; k];
    let mut counts = vec![0usize; k];

    for (point, &cluster) in points.iter().zip(assignments.iter()) {
        for (acc, v) in sums[cluster].iter_mut().zip(point.iter()) {
            *acc += v;
        }
        counts[cluster] += 1;
    }

    for (cluster, sum) in sums.into_iter().enumerate() {
        if counts[cluster] == 0 {
            continue;
        }
        let count = counts[cluster] as f32;
        centroids[cluster] = sum.into_iter().map(|v| v / count).collect();
    }
}
