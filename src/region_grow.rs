use crate::fft::idx3d;
use crate::priority_queue::BucketQueue;
use std::f64::consts::PI;

/// Neighbor offsets: (dimension_for_weight, di, dj, dk)
/// dimension 0 = x edges, 1 = y edges, 2 = z edges
const NEIGHBOR_OFFSETS: [(usize, i64, i64, i64); 6] = [
    (0, 1, 0, 0),
    (0, -1, 0, 0),
    (1, 0, 1, 0),
    (1, 0, -1, 0),
    (2, 0, 0, 1),
    (2, 0, 0, -1),
];

const TWO_PI: f64 = 2.0 * PI;

/// Visited-state values used in the work mask
pub const OUTSIDE: u8 = 0;
pub const PENDING: u8 = 1;
pub const VISITED: u8 = 2;

/// Queue item: (target voxel, reference voxel), both flat indices
type QueueItem = (usize, usize);

/// Push the edges from voxel (i, j, k) to its unvisited in-mask neighbours
#[inline]
fn push_edges(
    pq: &mut BucketQueue<QueueItem>,
    weights: &[u8],
    state: &[u8],
    (i, j, k): (usize, usize, usize),
    nx: usize, ny: usize, nz: usize,
) {
    let n_total = nx * ny * nz;
    let from = idx3d(i, j, k, nx, ny);

    for &(dim, di, dj, dk) in &NEIGHBOR_OFFSETS {
        let ni = i as i64 + di;
        let nj = j as i64 + dj;
        let nk = k as i64 + dk;
        if ni < 0 || nj < 0 || nk < 0 || ni >= nx as i64 || nj >= ny as i64 || nk >= nz as i64 {
            continue;
        }
        let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
        let to = idx3d(ni, nj, nk, nx, ny);
        if state[to] != PENDING {
            continue;
        }

        // Edge weight is stored at the lower corner of the edge
        let edge = dim * n_total + idx3d(i.min(ni), j.min(nj), k.min(nk), nx, ny);
        let weight = weights[edge] as usize;
        if weight > 0 {
            pq.push(weight, (to, from));
        }
    }
}

/// Quality-guided region growing phase unwrapping
///
/// Starting from the seed, the highest-weight edge to an unvisited voxel is
/// taken next and the voxel is shifted by the multiple of 2π that brings it
/// closest to its already-unwrapped reference neighbour.
///
/// # Arguments
/// * `phase` - Phase values (nx * ny * nz), unwrapped in-place
/// * `weights` - Edge weights (3 * nx * ny * nz), layout [dim][x][y][z]
/// * `state` - Work mask: 0 = outside, 1 = pending, 2 = visited (updated in-place)
/// * `nx`, `ny`, `nz` - Array dimensions
/// * `seed` - Seed voxel coordinates
///
/// # Returns
/// Number of voxels visited, seed included (0 if the seed is not pending)
pub fn grow_region_unwrap(
    phase: &mut [f64],
    weights: &[u8],
    state: &mut [u8],
    nx: usize, ny: usize, nz: usize,
    seed: (usize, usize, usize),
) -> usize {
    let seed_idx = idx3d(seed.0, seed.1, seed.2, nx, ny);
    if state[seed_idx] != PENDING {
        return 0;
    }

    let mut pq: BucketQueue<QueueItem> = BucketQueue::new(256);
    state[seed_idx] = VISITED;
    let mut processed = 1usize;
    push_edges(&mut pq, weights, state, seed, nx, ny, nz);

    while let Some((target, reference)) = pq.pop() {
        if state[target] != PENDING {
            continue;
        }

        let diff = phase[target] - phase[reference];
        phase[target] -= TWO_PI * (diff / TWO_PI).round();

        state[target] = VISITED;
        processed += 1;

        let i = target % nx;
        let j = (target / nx) % ny;
        let k = target / (nx * ny);
        push_edges(&mut pq, weights, state, (i, j, k), nx, ny, nz);
    }

    processed
}
