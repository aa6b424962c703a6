//! Neighbor search.
//!
//! Every frame the solver needs, for each particle, the set of other particles
//! within the kernel support. The relation is built once from the predicted
//! positions and then stays frozen for all solver iterations and for the
//! finalization pass.
//!
//! Two strategies implement [`NeighborSearch`]: a uniform [`SpatialHashGrid`]
//! and a quadratic [`BruteForceSearch`] reference. Both produce identical
//! [`NeighborSet`]s, with neighbor indices sorted ascending.

use bevy::prelude::*;
use rayon::prelude::*;

use super::params::NeighborStrategy;

/// Frozen per-frame neighbor relation in compressed row form.
///
/// A particle is never its own neighbor. Two distinct particles `i` and `j`
/// are neighbors iff `|p_i - p_j| <= radius`, so the relation is symmetric.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborSet {
    offsets: Vec<usize>,
    indices: Vec<usize>,
    radius: f32,
}

impl NeighborSet {
    /// Build from one list per particle.
    pub fn from_lists(lists: Vec<Vec<usize>>, radius: f32) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut indices = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        offsets.push(0);
        for list in lists {
            indices.extend(list);
            offsets.push(indices.len());
        }
        Self {
            offsets,
            indices,
            radius,
        }
    }

    /// Neighbors of particle `i`. Empty for an out-of-range index.
    #[inline]
    pub fn neighbors_of(&self, i: usize) -> &[usize] {
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&start), Some(&end)) => &self.indices[start..end],
            _ => &[],
        }
    }

    /// Number of particles the set was built for.
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of directed neighbor pairs.
    pub fn total_pairs(&self) -> usize {
        self.indices.len()
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn max_neighbors(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }
}

/// A strategy for building the per-frame neighbor relation.
pub trait NeighborSearch: Send + Sync {
    /// Neighbors of every position within `radius` (inclusive), self excluded.
    fn find_neighbors(&mut self, positions: &[Vec3], radius: f32) -> NeighborSet;

    fn name(&self) -> &'static str;
}

impl NeighborStrategy {
    /// Instantiate the search this strategy names.
    pub fn build_search(self) -> Box<dyn NeighborSearch> {
        match self {
            NeighborStrategy::SpatialHash => Box::new(SpatialHashGrid::default()),
            NeighborStrategy::BruteForce => Box::new(BruteForceSearch),
        }
    }
}

/// Configuration for the spatial hash grid.
#[derive(Clone, Debug, Reflect)]
pub struct SpatialHashConfig {
    /// Minimum cell size. The grid never uses cells smaller than the query
    /// radius, so the 3x3x3 block around a cell covers the whole support.
    pub cell_size: f32,

    /// Number of hash buckets (should be prime for good distribution).
    pub hash_table_size: u32,
}

impl Default for SpatialHashConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.0,
            hash_table_size: 262147, // Prime number near 2^18
        }
    }
}

impl SpatialHashConfig {
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_hash_table_size(mut self, size: u32) -> Self {
        self.hash_table_size = size.max(1);
        self
    }

    /// Cell edge length used for a given query radius.
    pub fn effective_cell_size(&self, radius: f32) -> f32 {
        let cell = self.cell_size.max(radius);
        if cell > 0.0 && cell.is_finite() { cell } else { 1.0 }
    }

    /// Calculate the grid cell for a position.
    pub fn position_to_cell(position: Vec3, cell_size: f32) -> IVec3 {
        (position / cell_size).floor().as_ivec3()
    }

    /// Calculate the bucket for a cell coordinate.
    pub fn cell_to_hash(&self, cell: IVec3) -> u32 {
        // Large primes for hash mixing
        const P1: u32 = 73856093;
        const P2: u32 = 19349663;
        const P3: u32 = 83492791;

        let x = cell.x as u32;
        let y = cell.y as u32;
        let z = cell.z as u32;

        (x.wrapping_mul(P1) ^ y.wrapping_mul(P2) ^ z.wrapping_mul(P3)) % self.hash_table_size.max(1)
    }

    /// Offsets of the 3x3x3 block around a cell.
    pub fn neighbor_offsets() -> impl Iterator<Item = IVec3> {
        (-1..=1).flat_map(|x| (-1..=1).flat_map(move |y| (-1..=1).map(move |z| IVec3::new(x, y, z))))
    }
}

/// Uniform hashed grid. Unbounded: cells are hashed, not indexed, so particles
/// may wander anywhere.
#[derive(Debug)]
pub struct SpatialHashGrid {
    /// Bucket -> particle indices.
    table: Vec<Vec<usize>>,
    /// Buckets holding at least one particle.
    occupied: Vec<u32>,
    config: SpatialHashConfig,
}

impl Default for SpatialHashGrid {
    fn default() -> Self {
        Self::new(SpatialHashConfig::default())
    }
}

impl SpatialHashGrid {
    /// The bucket table is allocated on the first build.
    pub fn new(config: SpatialHashConfig) -> Self {
        Self {
            table: Vec::new(),
            occupied: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &SpatialHashConfig {
        &self.config
    }

    /// Empty the buckets filled by the last build.
    pub fn clear(&mut self) {
        for hash in self.occupied.drain(..) {
            self.table[hash as usize].clear();
        }
    }

    /// Rebuild the buckets from particle positions.
    pub fn build(&mut self, positions: &[Vec3], cell_size: f32) {
        self.clear();
        let table_size = self.config.hash_table_size.max(1) as usize;
        if self.table.len() != table_size {
            self.table = vec![Vec::new(); table_size];
        }
        for (i, &pos) in positions.iter().enumerate() {
            let cell = SpatialHashConfig::position_to_cell(pos, cell_size);
            let hash = self.config.cell_to_hash(cell);
            let bucket = &mut self.table[hash as usize];
            if bucket.is_empty() {
                self.occupied.push(hash);
            }
            bucket.push(i);
        }
    }

    /// Number of buckets holding particles after the last build.
    pub fn occupied_buckets(&self) -> usize {
        self.occupied.len()
    }

    /// Neighbors of particle `i` against the current buckets.
    fn query(&self, i: usize, positions: &[Vec3], cell_size: f32, radius_sq: f32) -> Vec<usize> {
        let position = positions[i];
        let cell = SpatialHashConfig::position_to_cell(position, cell_size);

        // Distinct cells may share a bucket; visit each bucket once.
        let mut buckets: Vec<u32> = SpatialHashConfig::neighbor_offsets()
            .map(|offset| self.config.cell_to_hash(cell + offset))
            .collect();
        buckets.sort_unstable();
        buckets.dedup();

        let mut neighbors: Vec<usize> = buckets
            .into_iter()
            .flat_map(|hash| self.table[hash as usize].iter().copied())
            .filter(|&j| j != i && (positions[j] - position).length_squared() <= radius_sq)
            .collect();
        neighbors.sort_unstable();
        neighbors
    }
}

impl NeighborSearch for SpatialHashGrid {
    fn find_neighbors(&mut self, positions: &[Vec3], radius: f32) -> NeighborSet {
        let cell_size = self.config.effective_cell_size(radius);
        self.build(positions, cell_size);

        let radius_sq = radius * radius;
        let grid = &*self;
        let lists: Vec<Vec<usize>> = (0..positions.len())
            .into_par_iter()
            .map(|i| grid.query(i, positions, cell_size, radius_sq))
            .collect();

        NeighborSet::from_lists(lists, radius)
    }

    fn name(&self) -> &'static str {
        "spatial-hash"
    }
}

/// Tests every pair. Reference implementation for small scenes and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct BruteForceSearch;

impl NeighborSearch for BruteForceSearch {
    fn find_neighbors(&mut self, positions: &[Vec3], radius: f32) -> NeighborSet {
        let radius_sq = radius * radius;
        let lists: Vec<Vec<usize>> = positions
            .par_iter()
            .enumerate()
            .map(|(i, &p)| {
                positions
                    .iter()
                    .enumerate()
                    .filter(|&(j, &q)| j != i && (q - p).length_squared() <= radius_sq)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();

        NeighborSet::from_lists(lists, radius)
    }

    fn name(&self) -> &'static str {
        "brute-force"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluid::particle::lattice_positions;

    fn scattered_positions() -> Vec<Vec3> {
        // Deterministic jitter around a lattice, crossing the origin so that
        // negative cell coordinates are exercised.
        lattice_positions(Vec3::splat(-0.2), Vec3::splat(0.2), 0.05)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let k = i as f32;
                p + Vec3::new((k * 0.37).sin(), (k * 0.73).cos(), (k * 1.31).sin()) * 0.01
            })
            .collect()
    }

    #[test]
    fn test_position_to_cell() {
        assert_eq!(SpatialHashConfig::position_to_cell(Vec3::new(0.5, 0.5, 0.5), 1.0), IVec3::ZERO);
        assert_eq!(
            SpatialHashConfig::position_to_cell(Vec3::new(1.5, 0.5, -0.5), 1.0),
            IVec3::new(1, 0, -1)
        );
    }

    #[test]
    fn test_neighbor_offsets_cover_block() {
        let offsets: Vec<IVec3> = SpatialHashConfig::neighbor_offsets().collect();
        assert_eq!(offsets.len(), 27);
        assert!(offsets.contains(&IVec3::ZERO));
        assert!(offsets.contains(&IVec3::new(-1, 1, -1)));
    }

    #[test]
    fn test_cell_never_smaller_than_radius() {
        let config = SpatialHashConfig::default().with_cell_size(0.05);
        assert_eq!(config.effective_cell_size(0.1), 0.1);
        assert_eq!(config.effective_cell_size(0.01), 0.05);
    }

    #[test]
    fn test_hash_matches_brute_force() {
        let positions = scattered_positions();
        let radius = 0.1;

        let hashed = SpatialHashGrid::default().find_neighbors(&positions, radius);
        let brute = BruteForceSearch.find_neighbors(&positions, radius);

        assert_eq!(hashed, brute);
        assert!(hashed.total_pairs() > 0);
    }

    #[test]
    fn test_small_table_with_collisions_matches_brute_force() {
        let positions = scattered_positions();
        let mut grid = SpatialHashGrid::new(SpatialHashConfig::default().with_hash_table_size(7));

        assert_eq!(
            grid.find_neighbors(&positions, 0.08),
            BruteForceSearch.find_neighbors(&positions, 0.08)
        );
    }

    #[test]
    fn test_rebuild_only_touches_filled_buckets() {
        let mut grid = SpatialHashGrid::default();
        let cluster = vec![Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.0, 0.05, 0.0)];
        grid.find_neighbors(&cluster, 0.1);
        assert!(grid.occupied_buckets() >= 1 && grid.occupied_buckets() <= cluster.len());

        // Stale entries from the previous frame must not leak into the next.
        let moved = scattered_positions();
        assert_eq!(grid.find_neighbors(&moved, 0.1), BruteForceSearch.find_neighbors(&moved, 0.1));
        assert!(grid.occupied_buckets() <= moved.len());

        grid.clear();
        assert_eq!(grid.occupied_buckets(), 0);
        assert!(grid.table.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_self_excluded_and_symmetric() {
        let positions = scattered_positions();
        let set = SpatialHashGrid::default().find_neighbors(&positions, 0.1);

        for i in 0..positions.len() {
            assert!(!set.neighbors_of(i).contains(&i));
            for &j in set.neighbors_of(i) {
                assert!(set.neighbors_of(j).contains(&i));
            }
        }
    }

    #[test]
    fn test_radius_is_inclusive() {
        let positions = vec![Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.5001, 0.0, 0.0)];
        let set = SpatialHashGrid::default().find_neighbors(&positions, 0.5);

        assert_eq!(set.neighbors_of(0), &[1]);
        assert_eq!(set.neighbors_of(1), &[0, 2]);
    }

    #[test]
    fn test_isolated_particle_has_no_neighbors() {
        let positions = vec![Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0), Vec3::splat(10.0)];
        let set = BruteForceSearch.find_neighbors(&positions, 0.1);

        assert_eq!(set.len(), 3);
        assert!(set.neighbors_of(2).is_empty());
        assert_eq!(set.max_neighbors(), 1);
        assert!(set.neighbors_of(99).is_empty());
    }

    #[test]
    fn test_empty_input() {
        let set = SpatialHashGrid::default().find_neighbors(&[], 0.1);
        assert!(set.is_empty());
        assert_eq!(set.total_pairs(), 0);
    }
}
