//! Proximity clustering of point sets.
//!
//! # Algorithm
//!
//! Points are nodes of an undirected graph with an edge between any two
//! points at most `threshold` apart. Each connected component becomes one
//! [`Centroid`] at the mean of its members. Membership chains: a point joins a
//! cluster through any neighbour, even if it ends up farther than `threshold`
//! from the final centroid.
//!
//! The partition does not depend on input order. Every cycle recomputes from
//! scratch in O(n²).

use phyvision_scene_model::geometry::{Centroid, Point};

/// Clustering engine.
pub struct ClusterEngine {
    algorithm: ClusteringAlgorithm,
}

/// Available clustering algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusteringAlgorithm {
    /// Connected components of the `threshold` proximity graph.
    Connectivity { threshold: f64 },

    /// Each point joins the first existing cluster whose running centroid is
    /// within `threshold`, otherwise starts a new one.
    ///
    /// Order dependent and does not chain. Produces different partitions than
    /// `Connectivity` for the same input.
    Greedy { threshold: f64 },
}

impl ClusterEngine {
    /// Create an engine with the given algorithm.
    pub fn new(algorithm: ClusteringAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Connectivity clustering with `threshold`.
    pub fn connectivity(threshold: f64) -> Self {
        Self::new(ClusteringAlgorithm::Connectivity { threshold })
    }

    pub fn algorithm(&self) -> ClusteringAlgorithm {
        self.algorithm
    }

    /// Cluster `points` into centroids.
    pub fn cluster(&self, points: &[Point]) -> Vec<Centroid> {
        match self.algorithm {
            ClusteringAlgorithm::Connectivity { threshold } => cluster_points(points, threshold),
            ClusteringAlgorithm::Greedy { threshold } => cluster_greedy(points, threshold),
        }
    }
}

/// Connectivity clustering. Distances equal to `threshold` link.
///
/// A negative or NaN threshold behaves like `0.0`.
pub fn cluster_points(points: &[Point], threshold: f64) -> Vec<Centroid> {
    connected_components(points, threshold)
        .iter()
        .map(|members| centroid_of(members.iter().map(|&i| &points[i])))
        .collect()
}

/// Indices of each connected component, in discovery order.
///
/// Components are discovered by ascending index of their first member.
pub fn connected_components(points: &[Point], threshold: f64) -> Vec<Vec<usize>> {
    let threshold = sanitize_threshold(threshold);
    let mut visited = vec![false; points.len()];
    let mut components = Vec::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }

        let mut members = Vec::new();
        let mut stack = vec![seed];
        visited[seed] = true;

        while let Some(idx) = stack.pop() {
            members.push(idx);
            let p = &points[idx];

            for (j, q) in points.iter().enumerate() {
                if !visited[j] && p.distance_to(q) <= threshold {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }

        components.push(members);
    }

    components
}

/// Greedy first-fit clustering against running centroids.
pub fn cluster_greedy(points: &[Point], threshold: f64) -> Vec<Centroid> {
    let threshold = sanitize_threshold(threshold);
    let mut clusters: Vec<(Point, Vec<Point>)> = Vec::new();

    for p in points {
        match clusters
            .iter_mut()
            .find(|(center, _)| center.distance_to(p) <= threshold)
        {
            Some((center, members)) => {
                members.push(*p);
                *center = centroid_of(members.iter()).position();
            }
            None => clusters.push((*p, vec![*p])),
        }
    }

    clusters
        .iter()
        .map(|(_, members)| centroid_of(members.iter()))
        .collect()
}

fn centroid_of<'a>(members: impl Iterator<Item = &'a Point>) -> Centroid {
    let (sum_x, sum_y, size) = members.fold((0.0, 0.0, 0usize), |(sx, sy, n), p| {
        (sx + p.x, sy + p.y, n + 1)
    });
    debug_assert!(size > 0, "centroid of an empty cluster");
    let n = size.max(1) as f64;
    Centroid {
        x: sum_x / n,
        y: sum_y / n,
        size,
    }
}

fn sanitize_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() || threshold < 0.0 {
        tracing::debug!(threshold, "Clamping invalid cluster threshold to 0");
        0.0
    } else {
        threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_points(&[], 10.0).is_empty());
        assert!(cluster_greedy(&[], 10.0).is_empty());
    }

    #[test]
    fn test_chaining_links_transitively() {
        let points = pts(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let clusters = cluster_points(&points, 10.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size, 3);
        assert!((clusters[0].x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_threshold_merges_only_coincident_points() {
        let points = pts(&[(0.0, 0.0), (0.0, 0.0), (5.0, 5.0)]);
        let clusters = cluster_points(&points, 0.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(
            clusters[0],
            Centroid {
                x: 0.0,
                y: 0.0,
                size: 2
            }
        );
        assert_eq!(
            clusters[1],
            Centroid {
                x: 5.0,
                y: 5.0,
                size: 1
            }
        );
    }

    #[test]
    fn test_boundary_distance_is_inclusive() {
        let points = pts(&[(0.0, 0.0), (3.0, 4.0)]);
        assert_eq!(cluster_points(&points, 5.0).len(), 1);
        assert_eq!(cluster_points(&points, 4.999).len(), 2);
    }

    #[test]
    fn test_separated_groups() {
        let points = pts(&[
            (0.0, 0.0),
            (500.0, 500.0),
            (2.0, 0.0),
            (502.0, 500.0),
            (1000.0, 0.0),
        ]);
        let clusters = cluster_points(&points, 5.0);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].size, 2);
        assert!((clusters[0].x - 1.0).abs() < 1e-9);
        assert_eq!(clusters[1].size, 2);
        assert!((clusters[1].x - 501.0).abs() < 1e-9);
        assert_eq!(clusters[2].size, 1);
    }

    #[test]
    fn test_negative_threshold_acts_as_zero() {
        let points = pts(&[(1.0, 1.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(cluster_points(&points, -3.0).len(), 2);
        assert_eq!(cluster_points(&points, f64::NAN).len(), 2);
    }

    #[test]
    fn test_greedy_does_not_chain() {
        let points = pts(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let engine = ClusterEngine::new(ClusteringAlgorithm::Greedy { threshold: 10.0 });
        let clusters = engine.cluster(&points);
        // (0,0) and (10,0) merge at x=5; (20,0) is 15 away from that centroid.
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].size, 2);
        assert!((clusters[0].x - 5.0).abs() < 1e-9);
        assert_eq!(clusters[1].size, 1);
    }

    #[test]
    fn test_engine_defaults_to_connectivity_semantics() {
        let engine = ClusterEngine::connectivity(10.0);
        let points = pts(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        assert_eq!(engine.cluster(&points).len(), 1);
        assert_eq!(
            engine.algorithm(),
            ClusteringAlgorithm::Connectivity { threshold: 10.0 }
        );
    }

    fn arb_points() -> impl Strategy<Value = Vec<Point>> {
        prop::collection::vec((0.0f64..200.0, 0.0f64..200.0), 0..40)
            .prop_map(|v| v.into_iter().map(|(x, y)| Point::new(x, y)).collect())
    }

    fn canonical(mut components: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        for c in &mut components {
            c.sort_unstable();
        }
        components.sort();
        components
    }

    proptest! {
        #[test]
        fn sizes_account_for_every_point(points in arb_points(), threshold in 0.0f64..60.0) {
            let clusters = cluster_points(&points, threshold);
            let total: usize = clusters.iter().map(|c| c.size).sum();
            prop_assert_eq!(total, points.len());
            prop_assert!(clusters.iter().all(|c| c.size >= 1));

            let components = connected_components(&points, threshold);
            for (c, members) in clusters.iter().zip(&components) {
                prop_assert_eq!(c.size, members.len());
            }
        }

        #[test]
        fn partition_is_permutation_invariant(
            (points, perm) in arb_points().prop_flat_map(|points| {
                let n = points.len();
                (Just(points), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
            }),
            threshold in 0.0f64..60.0,
        ) {
            let permuted: Vec<Point> = perm.iter().map(|&i| points[i]).collect();

            let original = canonical(connected_components(&points, threshold));
            let shuffled = canonical(
                connected_components(&permuted, threshold)
                    .into_iter()
                    .map(|c| c.into_iter().map(|i| perm[i]).collect())
                    .collect(),
            );
            prop_assert_eq!(original, shuffled);
        }

        #[test]
        fn centroids_lie_within_member_bounds(points in arb_points(), threshold in 0.0f64..60.0) {
            for (c, members) in cluster_points(&points, threshold)
                .iter()
                .zip(connected_components(&points, threshold))
            {
                let min_x = members.iter().map(|&i| points[i].x).fold(f64::INFINITY, f64::min);
                let max_x = members.iter().map(|&i| points[i].x).fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(c.x >= min_x - 1e-9 && c.x <= max_x + 1e-9);
            }
        }
    }
}
