use super::*;

/// Dense voxel volume centered on the world origin. Cells are stored
/// z-major (`z * width * height + y * width + x`) as packed `Voxel` bits so
/// that fusion passes can write through a shared reference. Clearing and
/// rescaling need `&mut self`, which keeps them sequenced against the
/// fusion and render passes.
pub struct VoxelGrid {
    width: usize,
    height: usize,
    length: usize,
    scale: Vec3,
    aabb: Aabb,
    cells: Box<[AtomicU32]>,
}

impl VoxelGrid {
    pub fn new(width: usize, height: usize, length: usize, scale: Vec3) -> Result<Self> {
        ensure!(
            width > 0 && height > 0 && length > 0,
            "Grid dimensions must be non-zero, got {width}x{height}x{length}"
        );
        let cell_count = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(length))
            .ok_or_else(|| anyhow!("Grid {width}x{height}x{length} is too large"))?;
        let cells = (0..cell_count)
            .map(|_| AtomicU32::new(Voxel::EMPTY.to_bits()))
            .collect();
        let mut grid = Self {
            width,
            height,
            length,
            scale: Vec3::repeat(1.0),
            aabb: Aabb::from_min_max(&Point3::origin(), &Point3::origin()),
            cells,
        };
        grid.set_scale(scale)?;
        debug!(
            "Allocated {width}x{height}x{length} voxel grid, {:.01} MiB",
            (cell_count * std::mem::size_of::<Voxel>()) as f64 / (1024.0 * 1024.0)
        );
        Ok(grid)
    }

    /// Recomputes the world-space bounds. Storage is neither resized nor
    /// cleared.
    pub fn set_scale(&mut self, scale: Vec3) -> Result<()> {
        ensure!(
            scale.iter().all(|s| s.is_finite() && *s > 0.0),
            "Grid scale must be positive, got {scale:?}"
        );
        let scaled_size = self.dims().map(|c| c as f32).component_mul(&scale);
        let position = Point3::from(-scaled_size / 2.0);
        self.scale = scale;
        self.aabb = Aabb::from_min_max(&position, &(position + scaled_size));
        Ok(())
    }

    #[inline]
    pub fn dims(&self) -> Vec3u {
        vector![self.width, self.height, self.length]
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[inline]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    #[inline]
    pub fn position(&self) -> Point3 {
        self.aabb.min()
    }

    #[allow(dead_code)]
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    //
    // Index mapping
    //

    #[inline]
    pub fn index_of(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.width * self.height + y * self.width + x
    }

    #[allow(dead_code)]
    pub fn coords_of(&self, index: usize) -> Vec3u {
        let z = index / (self.width * self.height);
        let rest = index - z * self.width * self.height;
        vector![rest % self.width, rest / self.width, z]
    }

    fn checked_index(&self, cell: &Vec3i) -> Option<usize> {
        let in_bounds = cell.x >= 0
            && cell.y >= 0
            && cell.z >= 0
            && (cell.x as usize) < self.width
            && (cell.y as usize) < self.height
            && (cell.z as usize) < self.length;
        in_bounds.then(|| self.index_of(cell.x as usize, cell.y as usize, cell.z as usize))
    }

    /// Grid-local continuous coordinates, one unit per cell.
    #[inline]
    pub fn local_of(&self, point: &Point3) -> Vec3 {
        (point - self.position()).component_div(&self.scale)
    }

    //
    // Read/write
    //

    /// Out-of-bounds reads return the empty voxel.
    pub fn get(&self, cell: &Vec3i) -> Voxel {
        self.checked_index(cell).map_or(Voxel::EMPTY, |index| {
            Voxel::from_bits(self.cells[index].load(Ordering::Relaxed))
        })
    }

    /// Overwrites one cell. Returns `false` when `cell` is out of bounds.
    #[allow(dead_code)]
    pub fn set(&self, cell: &Vec3i, voxel: Voxel) -> bool {
        self.checked_index(cell).map_or(false, |index| {
            self.cells[index].store(voxel.to_bits(), Ordering::Relaxed);
            true
        })
    }

    /// Writes `voxel` into a cell, keeping provenance bits from earlier
    /// camera passes.
    pub fn fuse(&self, cell: &Vec3i, voxel: Voxel) -> bool {
        self.checked_index(cell).map_or(false, |index| {
            // The closure never returns `None`, so the update always succeeds.
            let _ = self.cells[index].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some(Voxel::from_bits(bits).merged(voxel).to_bits())
            });
            true
        })
    }

    pub fn clear(&mut self) {
        self.cells
            .par_iter_mut()
            .for_each(|cell| *cell.get_mut() = Voxel::EMPTY.to_bits());
    }

    pub fn occupied_count(&self) -> usize {
        self.cells
            .par_iter()
            .filter(|cell| Voxel::from_bits(cell.load(Ordering::Relaxed)).is_occupied())
            .count()
    }

    //
    // Ray queries
    //

    /// Fusion write: walks `ray` from its first grid entry at or past
    /// `start_distance`, writing `rgb` with the provenance bit of `side` into
    /// the first cell and `extra_thickness` cells behind it. The ray origin
    /// is shifted by `lateral_offset` along +X first. Returns the number of
    /// cells written.
    pub fn set_voxel(
        &self,
        ray: &Ray,
        start_distance: f32,
        rgb: [u8; 3],
        side: CameraSide,
        lateral_offset: f32,
        extra_thickness: usize,
    ) -> usize {
        let ray = ray.translated(&vector![lateral_offset, 0.0, 0.0]);
        let Some(walk) = GridWalk::new(self, &ray, start_distance, f32::MAX) else {
            return 0;
        };
        let voxel = Voxel::fused(rgb, side);
        walk.take(1 + extra_thickness)
            .filter(|step| self.fuse(&step.cell, voxel))
            .count()
    }

    /// Render read: nearest cell along `ray` within `[tmin, tmax]` that counts
    /// as a surface under `policy`.
    #[allow(dead_code)]
    pub fn hit(
        &self,
        ray: &Ray,
        tmin: f32,
        tmax: f32,
        policy: OccupancyPolicy,
    ) -> Option<(GridStep, Voxel)> {
        GridWalk::new(self, ray, tmin, tmax)?
            .map(|step| (step, self.get(&step.cell)))
            .find(|(_, voxel)| voxel.is_surface(policy))
    }

    /// Render read that accumulates the first `samples` surface cells along
    /// `ray` instead of stopping at the nearest one.
    pub fn hit_accumulated(
        &self,
        ray: &Ray,
        tmin: f32,
        tmax: f32,
        policy: OccupancyPolicy,
        samples: usize,
    ) -> VoxelHit {
        let mut hit = VoxelHit::default();
        if let Some(walk) = GridWalk::new(self, ray, tmin, tmax) {
            walk.map(|step| self.get(&step.cell))
                .filter(|voxel| voxel.is_surface(policy))
                .filter_map(Voxel::color)
                .take(samples)
                .for_each(|color| hit.hit(color));
        }
        hit
    }
}

//
// Tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;

    #[test]
    fn bounds_are_centered() {
        let grid = VoxelGrid::new(8, 4, 2, vector![1.0, 2.0, 0.5]).unwrap();
        assert_eq!(grid.aabb().min(), Point3::new(-4.0, -4.0, -0.5));
        assert_eq!(grid.aabb().max(), Point3::new(4.0, 4.0, 0.5));
        assert_eq!(grid.cell_count(), 64);
    }

    #[test]
    fn rescale_keeps_contents() {
        let mut grid = VoxelGrid::new(2, 2, 2, Vec3::repeat(1.0)).unwrap();
        let cell = vector![1, 1, 1];
        grid.set(&cell, Voxel::fused([9, 9, 9], CameraSide::Left));
        grid.set_scale(Vec3::repeat(3.0)).unwrap();
        assert_eq!(grid.aabb().max(), Point3::new(3.0, 3.0, 3.0));
        assert_eq!(grid.get(&cell).rgb(), Some([9, 9, 9]));
        assert!(grid.set_scale(vector![1.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn invalid_dimensions() {
        assert!(VoxelGrid::new(0, 1, 1, Vec3::repeat(1.0)).is_err());
        assert!(VoxelGrid::new(1, 1, 1, Vec3::repeat(-1.0)).is_err());
    }

    #[test]
    fn index_mapping() {
        let grid = VoxelGrid::new(4, 3, 2, Vec3::repeat(1.0)).unwrap();
        assert_eq!(grid.index_of(0, 0, 0), 0);
        assert_eq!(grid.index_of(3, 0, 0), 3);
        assert_eq!(grid.index_of(0, 1, 0), 4);
        assert_eq!(grid.index_of(0, 0, 1), 12);
        assert_eq!(grid.index_of(3, 2, 1), 23);
        for index in 0..grid.cell_count() {
            let c = grid.coords_of(index);
            assert_eq!(grid.index_of(c.x, c.y, c.z), index);
        }
    }

    #[test]
    fn out_of_bounds_access() {
        let grid = VoxelGrid::new(2, 2, 2, Vec3::repeat(1.0)).unwrap();
        let voxel = Voxel::fused([1, 2, 3], CameraSide::Right);
        assert!(!grid.set(&vector![2, 0, 0], voxel));
        assert!(!grid.fuse(&vector![0, -1, 0], voxel));
        assert_eq!(grid.get(&vector![0, 0, 5]), Voxel::EMPTY);
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn world_to_local() {
        let grid = VoxelGrid::new(2, 2, 2, Vec3::repeat(1.0)).unwrap();
        let voxel = Voxel::fused([1, 2, 3], CameraSide::Right);
        grid.set(&vector![1, 0, 1], voxel);
        let local = grid.local_of(&Point3::new(0.5, -0.5, 0.25));
        assert_ulps_eq!(local.x, 1.5, max_ulps = 1);
        assert_ulps_eq!(local.y, 0.5, max_ulps = 1);
        assert_ulps_eq!(local.z, 1.25, max_ulps = 1);
        assert_eq!(grid.get(&local.map(|c| c.floor() as i32)), voxel);
    }

    #[test]
    fn clear_empties_every_cell() {
        let mut grid = VoxelGrid::new(3, 3, 3, Vec3::repeat(1.0)).unwrap();
        for index in 0..grid.cell_count() {
            let c = grid.coords_of(index).map(|c| c as i32);
            grid.set(&c, Voxel::fused([1, 1, 1], CameraSide::Left));
        }
        assert_eq!(grid.occupied_count(), 27);
        grid.clear();
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn set_voxel_then_read_back() {
        let grid = VoxelGrid::new(8, 8, 8, Vec3::repeat(1.0)).unwrap();
        let ray = Ray::new(Point3::new(0.5, 0.5, 10.0), vector![0.0, 0.0, -1.0]).unwrap();
        let written = grid.set_voxel(&ray, 7.0, [200, 100, 50], CameraSide::Left, 0.0, 0);
        assert_eq!(written, 1);

        // Entry at t = 7 lands on z = 3, cell 6 along z.
        let voxel = grid.get(&vector![4, 4, 6]);
        assert_eq!(voxel.rgb(), Some([200, 100, 50]));
        assert!(voxel.seen_by(CameraSide::Left));
        assert!(!voxel.seen_by(CameraSide::Right));
        assert_eq!(grid.occupied_count(), 1);
    }

    #[test]
    fn set_voxel_writes_slab() {
        let grid = VoxelGrid::new(8, 8, 8, Vec3::repeat(1.0)).unwrap();
        let ray = Ray::new(Point3::new(0.5, 0.5, 10.0), vector![0.0, 0.0, -1.0]).unwrap();
        assert_eq!(grid.set_voxel(&ray, 7.0, [1, 1, 1], CameraSide::Right, 0.0, 3), 4);
        for z in 3..=6 {
            assert!(grid.get(&vector![4, 4, z]).is_occupied());
        }
        assert!(!grid.get(&vector![4, 4, 2]).is_occupied());

        // Thickness is cut short by the far face.
        assert_eq!(grid.set_voxel(&ray, 12.0, [1, 1, 1], CameraSide::Right, 0.0, 50), 2);
    }

    #[test]
    fn set_voxel_misses_grid() {
        let grid = VoxelGrid::new(4, 4, 4, Vec3::repeat(1.0)).unwrap();
        let ray = Ray::new(Point3::new(10.0, 0.0, 10.0), vector![0.0, 0.0, -1.0]).unwrap();
        assert_eq!(grid.set_voxel(&ray, 0.0, [1, 1, 1], CameraSide::Left, 0.0, 5), 0);

        // The same ray shifted sideways into the grid does hit.
        let written = grid.set_voxel(&ray, 0.0, [1, 1, 1], CameraSide::Left, -9.5, 0);
        assert_eq!(written, 1);
        assert!(grid.get(&vector![2, 2, 3]).is_occupied());
    }

    #[test]
    fn both_cameras_merge() {
        let grid = VoxelGrid::new(4, 4, 4, Vec3::repeat(1.0)).unwrap();
        let ray = Ray::new(Point3::new(0.5, 0.5, 10.0), vector![0.0, 0.0, -1.0]).unwrap();
        grid.set_voxel(&ray, 0.0, [10, 0, 0], CameraSide::Left, 0.0, 0);
        let (_, voxel) = grid.hit(&ray, 0.0, 100.0, OccupancyPolicy::AnyCamera).unwrap();
        assert!(!voxel.is_surface(OccupancyPolicy::BothCameras));
        assert!(grid.hit(&ray, 0.0, 100.0, OccupancyPolicy::BothCameras).is_none());

        grid.set_voxel(&ray, 0.0, [20, 0, 0], CameraSide::Right, 0.0, 0);
        let (step, voxel) = grid.hit(&ray, 0.0, 100.0, OccupancyPolicy::BothCameras).unwrap();
        assert_eq!(step.cell, vector![2, 2, 3]);
        assert_eq!(voxel.rgb(), Some([20, 0, 0]));
    }

    #[test]
    fn nearest_surface_wins() {
        let grid = VoxelGrid::new(8, 8, 1, Vec3::repeat(1.0)).unwrap();
        grid.set(&vector![5, 0, 0], Voxel::fused([50, 0, 0], CameraSide::Left));
        grid.set(&vector![7, 0, 0], Voxel::fused([70, 0, 0], CameraSide::Left));

        // Ray along +X through the bottom row, in grid-local (0, 0, 0).
        let origin = grid.aabb().min();
        let ray = Ray::new(origin, vector![1.0, 0.0, 0.0]).unwrap();
        let (step, voxel) = grid.hit(&ray, 0.0, 100.0, OccupancyPolicy::AnyCamera).unwrap();
        assert_eq!(step.cell, vector![5, 0, 0]);
        assert_eq!(voxel.rgb(), Some([50, 0, 0]));
        assert_ulps_eq!(step.t, 5.0, max_ulps = 1);

        // Interval ends before the surface.
        assert!(grid.hit(&ray, 0.0, 4.5, OccupancyPolicy::AnyCamera).is_none());
    }

    #[test]
    fn accumulated_hit() {
        let grid = VoxelGrid::new(8, 8, 1, Vec3::repeat(1.0)).unwrap();
        grid.set(&vector![2, 0, 0], Voxel::fused([255, 0, 0], CameraSide::Left));
        grid.set(&vector![4, 0, 0], Voxel::fused([255, 0, 0], CameraSide::Left));
        grid.set(&vector![6, 0, 0], Voxel::fused([255, 0, 0], CameraSide::Left));
        let ray = Ray::new(grid.aabb().min(), vector![1.0, 0.0, 0.0]).unwrap();

        let hit = grid.hit_accumulated(&ray, 0.0, 100.0, OccupancyPolicy::AnyCamera, 2);
        assert_eq!(hit.count(), 2);
        assert_ulps_eq!(hit.exposed().r(), 0.5, max_ulps = 1);

        let miss = grid.hit_accumulated(&ray, 0.0, 1.0, OccupancyPolicy::AnyCamera, 2);
        assert!(miss.is_empty());
    }
}
