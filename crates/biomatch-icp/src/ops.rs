/// Compute the centroid of a set of points.
///
/// Returns the origin for an empty set.
pub(crate) fn compute_centroid<const D: usize>(points: &[[f64; D]]) -> [f64; D] {
    let mut centroid = [0.0; D];
    if points.is_empty() {
        return centroid;
    }

    for p in points {
        for (c, v) in centroid.iter_mut().zip(p) {
            *c += v;
        }
    }

    let n = points.len() as f64;
    centroid.iter_mut().for_each(|c| *c /= n);
    centroid
}

/// Squared euclidean distance between two points.
#[inline]
pub(crate) fn distance_sq<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// The adaptive match cutoff radius, `2 * sqrt(|c_t - c_s|^2 + 1)`.
pub(crate) fn cutoff_radius<const D: usize>(
    target_centroid: &[f64; D],
    source_centroid: &[f64; D],
) -> f64 {
    2.0 * (distance_sq(target_centroid, source_centroid) + 1.0).sqrt()
}

/// Fill `rank` with the indices `0..distances.len()` ordered by ascending distance.
pub(crate) fn rank_by_distance(rank: &mut Vec<usize>, distances: &[f64]) {
    rank.clear();
    rank.extend(0..distances.len());
    rank.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
}

/// Length of the ranked prefix whose distances are strictly below `cutoff`.
pub(crate) fn count_below(rank: &[usize], distances: &[f64], cutoff: f64) -> usize {
    rank.partition_point(|&i| distances[i] < cutoff)
}
