use std::collections::HashMap;

use glam::{IVec3, Vec3};

/// Spatial hash grid for efficient neighbor queries.
///
/// Divides the cubic world volume into fixed-size buckets. Only occupied
/// buckets are stored, so memory follows the entity count rather than the
/// world volume. The grid is cleared and refilled every tick, so it never
/// needs per-entity removal.
#[derive(Debug, Clone)]
pub struct SpatialHash<T> {
    /// Edge length of one bucket; must be >= the largest query radius in use
    cell_size: f32,
    /// Minimum corner of the world volume
    origin: Vec3,
    /// Buckets per axis
    dims: IVec3,
    buckets: HashMap<IVec3, Vec<(T, Vec3)>>,
    len: usize,
}

impl<T: Copy> SpatialHash<T> {
    /// Create a grid covering a cube of `world_size` centred on the origin.
    pub fn new(world_size: f32, cell_size: f32) -> Self {
        let cell_size = cell_size.max(f32::EPSILON);
        let per_axis = ((world_size / cell_size).ceil() as i32).max(1);
        Self {
            cell_size,
            origin: Vec3::splat(-world_size * 0.5),
            dims: IVec3::splat(per_axis),
            buckets: HashMap::new(),
            len: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets currently holding at least one item.
    pub fn occupied_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket coordinates for a world position, clamped into the grid.
    pub fn world_to_bucket(&self, pos: Vec3) -> IVec3 {
        let local = (pos - self.origin) / self.cell_size;
        let raw = IVec3::new(
            truncate_finite(local.x),
            truncate_finite(local.y),
            truncate_finite(local.z),
        );
        raw.clamp(IVec3::ZERO, self.dims - IVec3::ONE)
    }

    /// Clear all entries (call at start of each tick before rebuilding)
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    /// Clear and re-insert every item.
    pub fn rebuild<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = (T, Vec3)>,
    {
        self.clear();
        for (item, position) in items {
            self.insert(item, position);
        }
    }

    pub fn insert(&mut self, item: T, position: Vec3) {
        let bucket = self.world_to_bucket(position);
        self.buckets
            .entry(bucket)
            .or_insert_with(|| Vec::with_capacity(8))
            .push((item, position));
        self.len += 1;
    }

    /// Candidates in every bucket within `ceil(radius / cell_size)` of the
    /// bucket holding `center`. May include items outside the radius.
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<(T, Vec3)> {
        let mut results = Vec::new();
        self.query_radius_into(center, radius, &mut results);
        results
    }

    /// Same as [`query_radius`](Self::query_radius), filling a reusable buffer.
    pub fn query_radius_into(&self, center: Vec3, radius: f32, results: &mut Vec<(T, Vec3)>) {
        results.clear();
        self.visit_candidates(center, radius, |item, position| results.push((item, position)));
    }

    /// Calls `visitor` for each candidate; bucket order is fixed (z, y, x).
    pub fn visit_candidates(&self, center: Vec3, radius: f32, mut visitor: impl FnMut(T, Vec3)) {
        if self.len == 0 || !radius.is_finite() || radius < 0.0 {
            return;
        }
        let reach = ((radius / self.cell_size).ceil() as i32).max(0);
        let center_bucket = self.world_to_bucket(center);
        let lower = |c: i32| (c as i64 - reach as i64).max(0) as i32;
        let upper = |c: i32, dim: i32| (c as i64 + reach as i64).min(dim as i64 - 1) as i32;
        let min = IVec3::new(lower(center_bucket.x), lower(center_bucket.y), lower(center_bucket.z));
        let max = IVec3::new(
            upper(center_bucket.x, self.dims.x),
            upper(center_bucket.y, self.dims.y),
            upper(center_bucket.z, self.dims.z),
        );

        let volume = (max - min + IVec3::ONE)
            .to_array()
            .iter()
            .fold(1i64, |acc, &n| acc.saturating_mul(n as i64));
        if volume <= self.buckets.len() as i64 {
            for z in min.z..=max.z {
                for y in min.y..=max.y {
                    for x in min.x..=max.x {
                        if let Some(bucket) = self.buckets.get(&IVec3::new(x, y, z)) {
                            for &(item, position) in bucket {
                                visitor(item, position);
                            }
                        }
                    }
                }
            }
            return;
        }

        // Sparse walk when the box covers more buckets than are occupied
        let mut keys: Vec<IVec3> = self
            .buckets
            .keys()
            .copied()
            .filter(|key| key.cmpge(min).all() && key.cmple(max).all())
            .collect();
        keys.sort_unstable_by_key(|key| (key.z, key.y, key.x));
        for key in keys {
            if let Some(bucket) = self.buckets.get(&key) {
                for &(item, position) in bucket {
                    visitor(item, position);
                }
            }
        }
    }

    /// Items whose stored position lies within `radius` of `center`.
    pub fn within(&self, center: Vec3, radius: f32) -> Vec<(T, Vec3)> {
        let radius_sq = radius * radius;
        let mut results = Vec::new();
        self.visit_candidates(center, radius, |item, position| {
            if position.distance_squared(center) <= radius_sq {
                results.push((item, position));
            }
        });
        results
    }
}

fn truncate_finite(value: f32) -> i32 {
    if value.is_finite() {
        value.floor() as i32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_positions_clamp_to_edge_buckets() {
        let mut grid = SpatialHash::new(100.0, 10.0);
        grid.insert(1u32, Vec3::new(500.0, -500.0, 0.0));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.world_to_bucket(Vec3::new(500.0, -500.0, 0.0)), IVec3::new(9, 0, 5));

        let found = grid.query_radius(Vec3::new(49.0, -49.0, 0.0), 1.0);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn rebuild_discards_previous_contents() {
        let mut grid = SpatialHash::new(100.0, 10.0);
        grid.rebuild([(1u32, Vec3::ZERO), (2, Vec3::ONE)]);
        grid.rebuild([(3u32, Vec3::new(20.0, 0.0, 0.0))]);
        assert_eq!(grid.len(), 1);
        assert!(grid.within(Vec3::ZERO, 5.0).is_empty());
    }

    #[test]
    fn non_finite_input_is_harmless() {
        let mut grid = SpatialHash::new(100.0, 10.0);
        grid.insert(7u32, Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(grid.query_radius(Vec3::ZERO, f32::INFINITY).is_empty());
        assert_eq!(grid.query_radius(Vec3::new(-50.0, 0.0, 0.0), 1.0).len(), 1);
    }

    #[test]
    fn huge_world_allocates_only_occupied_buckets() {
        let mut grid = SpatialHash::new(200_000.0, 20.0);
        assert_eq!(grid.dims(), IVec3::splat(10_000));
        grid.rebuild([
            (1u32, Vec3::ZERO),
            (2, Vec3::new(5.0, 0.0, 0.0)),
            (3, Vec3::splat(90_000.0)),
        ]);
        assert_eq!(grid.occupied_buckets(), 2);

        let near: Vec<u32> = grid.within(Vec3::ZERO, 10.0).into_iter().map(|(i, _)| i).collect();
        assert_eq!(near, vec![1, 2]);
        // A radius spanning the whole world takes the sparse path
        assert_eq!(grid.query_radius(Vec3::ZERO, 200_000.0).len(), 3);
    }

    #[test]
    fn sparse_and_dense_walks_agree_on_order() {
        // One item at the centre of every bucket in a 6x6x6 block
        let mut points = Vec::new();
        for z in 0..6 {
            for y in 0..6 {
                for x in 0..6 {
                    let centre = Vec3::new(x as f32, y as f32, z as f32) * 10.0 - Vec3::splat(25.0);
                    points.push((points.len() as u32, centre));
                }
            }
        }
        let mut grid = SpatialHash::new(100.0, 10.0);
        grid.rebuild(points.iter().copied());
        assert_eq!(grid.occupied_buckets(), 216);

        let dense: Vec<u32> = grid.query_radius(Vec3::ZERO, 5.0).into_iter().map(|(i, _)| i).collect();
        let sparse: Vec<u32> = grid.query_radius(Vec3::ZERO, 1_000.0).into_iter().map(|(i, _)| i).collect();
        assert_eq!(dense.len(), 27);
        assert_eq!(sparse.len(), points.len());
        let mut filtered = sparse.clone();
        filtered.retain(|i| dense.contains(i));
        assert_eq!(dense, filtered);
    }
}
