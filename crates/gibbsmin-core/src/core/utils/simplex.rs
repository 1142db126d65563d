use rand::Rng;
use std::ops::Range;

/// Euclidean projection of `values` onto the probability simplex, in place.
///
/// Sort-based algorithm: find the largest threshold `θ` such that
/// `Σ max(v_i - θ, 0) = 1` and shift every entry by it.
pub fn project_onto_simplex(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, &v) in sorted.iter().enumerate() {
        cumulative += v;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if v - candidate > 0.0 {
            theta = candidate;
        }
    }
    values.iter_mut().for_each(|v| *v = (*v - theta).max(0.0));
}

/// Clamps negatives to zero and rescales every block to sum to one.
///
/// A block whose entries are all zero is reset to its first vertex.
pub fn normalize_blocks(values: &mut [f64], blocks: &[Range<usize>]) {
    for block in blocks {
        let slice = &mut values[block.clone()];
        slice.iter_mut().for_each(|v| *v = v.max(0.0));
        let sum: f64 = slice.iter().sum();
        if sum > 0.0 {
            slice.iter_mut().for_each(|v| *v /= sum);
        } else if let Some(first) = slice.first_mut() {
            *first = 1.0;
        }
    }
}

/// Number of points of a regular simplex grid with `subdivisions` steps in
/// `dimension` coordinates, saturating at `usize::MAX`.
pub fn grid_size(dimension: usize, subdivisions: usize) -> usize {
    if dimension == 0 {
        return 0;
    }
    // C(subdivisions + dimension - 1, dimension - 1)
    let k = dimension - 1;
    let mut result: u128 = 1;
    for i in 1..=k as u128 {
        result = result * (subdivisions as u128 + i) / i;
        if result > usize::MAX as u128 {
            return usize::MAX;
        }
    }
    result as usize
}

/// All points of the simplex whose coordinates are multiples of `1 / subdivisions`,
/// in lexicographically decreasing order of the first coordinate.
pub fn simplex_grid(dimension: usize, subdivisions: usize) -> Vec<Vec<f64>> {
    if dimension == 0 {
        return Vec::new();
    }
    if subdivisions == 0 {
        let mut vertex = vec![0.0; dimension];
        vertex[0] = 1.0;
        return vec![vertex];
    }
    let mut points = Vec::with_capacity(grid_size(dimension, subdivisions));
    let mut counts = vec![0usize; dimension];
    fill_grid(&mut counts, 0, subdivisions, subdivisions, &mut points);
    points
}

fn fill_grid(
    counts: &mut [usize],
    position: usize,
    remaining: usize,
    subdivisions: usize,
    points: &mut Vec<Vec<f64>>,
) {
    if position == counts.len() - 1 {
        counts[position] = remaining;
        points.push(
            counts
                .iter()
                .map(|&c| c as f64 / subdivisions as f64)
                .collect(),
        );
        return;
    }
    for count in (0..=remaining).rev() {
        counts[position] = count;
        fill_grid(counts, position + 1, remaining - count, subdivisions, points);
    }
}

/// A point drawn uniformly from the simplex by normalising exponential variates.
pub fn random_simplex_point<R: Rng + ?Sized>(dimension: usize, rng: &mut R) -> Vec<f64> {
    let mut draws: Vec<f64> = (0..dimension)
        .map(|_| -(1.0 - rng.r#gen::<f64>()).ln())
        .collect();
    let sum: f64 = draws.iter().sum();
    if sum > 0.0 {
        draws.iter_mut().for_each(|d| *d /= sum);
    } else if let Some(first) = draws.first_mut() {
        *first = 1.0;
    }
    draws
}

/// Cartesian product of per-block point lists, concatenated block after block.
pub fn block_product(per_block: &[Vec<Vec<f64>>]) -> Vec<Vec<f64>> {
    per_block.iter().fold(vec![Vec::new()], |acc, block_points| {
        acc.iter()
            .flat_map(|prefix| {
                block_points.iter().map(move |point| {
                    let mut combined = prefix.clone();
                    combined.extend_from_slice(point);
                    combined
                })
            })
            .collect()
    })
}
