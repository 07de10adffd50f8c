use super::*;

// Implementation based on "A Fast Voxel Traversal Algorithm for Ray Tracing"
// by Amanatides and Woo. Cells are visited in strictly increasing `t` order,
// and the walk knows nothing about what the caller does with each cell.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridStep {
    /// Integer cell coordinate, always inside the grid.
    pub cell: Vec3i,
    /// Ray parameter at which the ray enters `cell`.
    pub t: f32,
}

#[derive(Clone, Debug)]
pub struct GridWalk {
    dims: Vec3i,
    cell: Vec3i,
    step: Vec3i,
    t: f32,
    t_end: f32,
    t_delta: Vec3,
    t_max: Vec3,
    remaining: usize,
}

impl GridWalk {
    /// Starts a walk at the first point where `ray` is inside `grid` within
    /// `[tmin, tmax]`. Returns `None` when the ray misses the grid.
    pub fn new(grid: &VoxelGrid, ray: &Ray, tmin: f32, tmax: f32) -> Option<Self> {
        let (t_enter, t_exit) = grid.aabb().hit(ray, tmin, tmax)?;

        let dims = grid.dims().map(|c| c as i32);
        let local = grid.local_of(&ray.at(t_enter));
        let local_dir = ray.dir.component_div(&grid.scale());

        let mut cell = Vec3i::zeros();
        let mut step = Vec3i::zeros();
        let mut t_delta = Vec3::zeros();
        let mut t_max = Vec3::zeros();
        for axis in 0..3 {
            let d = local_dir[axis];
            let p = local[axis];

            // A ray starting exactly on a cell face belongs to the cell it is
            // heading into.
            let c = if d < 0.0 { p.ceil() - 1.0 } else { p.floor() };
            cell[axis] = (c as i32).clamp(0, dims[axis] - 1);

            step[axis] = if d > 0.0 { 1 } else { -1 };
            if d == 0.0 {
                t_delta[axis] = f32::INFINITY;
                t_max[axis] = f32::INFINITY;
            } else {
                let boundary = if d > 0.0 {
                    cell[axis] + 1
                } else {
                    cell[axis]
                };
                t_delta[axis] = (1.0 / d).abs();
                t_max[axis] = t_enter + ((boundary as f32 - p) / d).max(0.0);
            }
        }

        // Generous bound on the longest straight walk through the grid.
        let remaining = 3 * dims.iter().copied().max().unwrap_or(1) as usize;

        Some(Self {
            dims,
            cell,
            step,
            t: t_enter,
            t_end: t_exit,
            t_delta,
            t_max,
            remaining,
        })
    }

    fn in_bounds(&self) -> bool {
        (0..3).all(|axis| self.cell[axis] >= 0 && self.cell[axis] < self.dims[axis])
    }

    /// Axis with the smallest `t_max`, ties go to X, then Y, then Z.
    fn next_axis(&self) -> usize {
        let t = &self.t_max;
        if t.x <= t.y && t.x <= t.z {
            0
        } else if t.y <= t.z {
            1
        } else {
            2
        }
    }
}

impl Iterator for GridWalk {
    type Item = GridStep;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.t > self.t_end || !self.in_bounds() {
            return None;
        }
        let current = GridStep {
            cell: self.cell,
            t: self.t,
        };

        // Advance.
        let axis = self.next_axis();
        self.t = self.t_max[axis];
        self.cell[axis] += self.step[axis];
        self.t_max[axis] += self.t_delta[axis];
        self.remaining -= 1;

        Some(current)
    }
}

//
// Tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;

    fn unit_grid(width: usize, height: usize, length: usize) -> VoxelGrid {
        VoxelGrid::new(width, height, length, Vec3::repeat(1.0)).unwrap()
    }

    fn cells(walk: GridWalk) -> Vec<Vec3i> {
        walk.map(|step| step.cell).collect()
    }

    #[test]
    fn walk_along_x() {
        let grid = unit_grid(8, 8, 1);
        let ray = Ray::new(grid.aabb().min(), vector![1.0, 0.0, 0.0]).unwrap();
        let steps = GridWalk::new(&grid, &ray, 0.0, 100.0).unwrap().collect::<Vec<_>>();
        assert_eq!(steps.len(), 8);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.cell, vector![i as i32, 0, 0]);
            assert_ulps_eq!(step.t, i as f32, max_ulps = 1);
        }
    }

    #[test]
    fn walk_backwards_from_face() {
        // Origin exactly on the +X face, heading -X: no skipped or repeated cells.
        let grid = unit_grid(4, 1, 1);
        let origin = Point3::new(2.0, -0.5, -0.5);
        let ray = Ray::new(origin, vector![-1.0, 0.0, 0.0]).unwrap();
        let visited = cells(GridWalk::new(&grid, &ray, 0.0, 100.0).unwrap());
        assert_eq!(
            visited,
            vec![
                vector![3, 0, 0],
                vector![2, 0, 0],
                vector![1, 0, 0],
                vector![0, 0, 0]
            ]
        );
    }

    #[test]
    fn walk_from_interior_face() {
        let grid = unit_grid(4, 1, 1);
        let origin = Point3::new(0.0, 0.0, 0.0);
        let forward = Ray::new(origin, vector![1.0, 0.0, 0.0]).unwrap();
        let backward = Ray::new(origin, vector![-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(
            cells(GridWalk::new(&grid, &forward, 0.0, 100.0).unwrap()),
            vec![vector![2, 0, 0], vector![3, 0, 0]]
        );
        assert_eq!(
            cells(GridWalk::new(&grid, &backward, 0.0, 100.0).unwrap()),
            vec![vector![1, 0, 0], vector![0, 0, 0]]
        );
    }

    #[test]
    fn walk_from_outside() {
        let grid = unit_grid(4, 4, 4);
        let ray = Ray::new(Point3::new(0.5, 0.5, 10.0), vector![0.0, 0.0, -1.0]).unwrap();
        let steps = GridWalk::new(&grid, &ray, 0.0, 100.0).unwrap().collect::<Vec<_>>();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].cell, vector![2, 2, 3]);
        assert_ulps_eq!(steps[0].t, 8.0, max_ulps = 1);
        assert_eq!(steps[3].cell, vector![2, 2, 0]);
        assert_ulps_eq!(steps[3].t, 11.0, max_ulps = 1);
    }

    #[test]
    fn walk_misses() {
        let grid = unit_grid(4, 4, 4);
        let ray = Ray::new(Point3::new(0.5, 0.5, 10.0), vector![0.0, 0.0, 1.0]).unwrap();
        assert!(GridWalk::new(&grid, &ray, 0.0, 100.0).is_none());
    }

    #[test]
    fn diagonal_walk_is_face_connected() {
        let grid = unit_grid(16, 16, 16);
        let ray = Ray::new(Point3::new(-9.0, -8.5, -10.0), vector![1.0, 0.7, 0.9]).unwrap();
        let steps = GridWalk::new(&grid, &ray, 0.0, f32::MAX).unwrap().collect::<Vec<_>>();
        assert!(steps.len() > 1);
        for pair in steps.windows(2) {
            let d = pair[1].cell - pair[0].cell;
            let distance = d.iter().map(|c| c.abs()).sum::<i32>();
            assert_eq!(distance, 1, "{:?} -> {:?}", pair[0].cell, pair[1].cell);
            assert!(pair[1].t >= pair[0].t);
        }
    }

    #[test]
    fn visited_cells_contain_the_ray() {
        // Every cell must be intersected by the ray at a `t` inside the
        // tested interval.
        let grid = unit_grid(8, 8, 8);
        let rays = [
            (Point3::new(-6.0, 0.3, 0.1), vector![1.0, 0.2, -0.1]),
            (Point3::new(0.25, 0.25, 0.25), vector![-0.3, 1.0, 0.5]),
            (Point3::new(5.0, 5.0, 5.0), vector![-1.0, -1.0, -1.0]),
            (Point3::new(0.0, -3.5, 9.0), vector![0.0, 0.0, -1.0]),
        ];
        for (origin, dir) in rays {
            let ray = Ray::new(origin, dir).unwrap();
            let (tmin, tmax) = (0.5, 12.0);
            for step in GridWalk::new(&grid, &ray, tmin, tmax).unwrap() {
                assert!(step.t >= tmin - 1e-4 && step.t <= tmax + 1e-4);
                let lo = grid.position() + step.cell.map(|c| c as f32);
                let hi = lo + Vec3::repeat(1.0);
                let p = ray.at(step.t);
                let inside = (0..3)
                    .all(|axis| lo[axis] - 1e-3 <= p[axis] && p[axis] <= hi[axis] + 1e-3);
                assert!(
                    inside,
                    "cell {:?} does not contain ray at t={}",
                    step.cell,
                    step.t
                );
            }
        }
    }

    #[test]
    fn scaled_grid() {
        let grid = VoxelGrid::new(4, 4, 4, Vec3::repeat(2.0)).unwrap();
        let ray = Ray::new(Point3::new(1.0, 1.0, 10.0), vector![0.0, 0.0, -1.0]).unwrap();
        let steps = GridWalk::new(&grid, &ray, 0.0, 100.0).unwrap().collect::<Vec<_>>();
        assert_eq!(steps.len(), 4);
        assert_ulps_eq!(steps[0].t, 6.0, max_ulps = 1);
        assert_ulps_eq!(steps[1].t, 8.0, max_ulps = 1);
        assert_eq!(steps[0].cell, vector![2, 2, 3]);
    }

    #[test]
    fn long_axis_walk_is_not_truncated() {
        let grid = unit_grid(2, 2, 64);
        let ray = Ray::new(Point3::new(0.5, 0.5, -40.0), vector![0.0, 0.0, 1.0]).unwrap();
        assert_eq!(GridWalk::new(&grid, &ray, 0.0, f32::MAX).unwrap().count(), 64);
    }
}
