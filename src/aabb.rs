use super::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    extents: [Point3; 2],
}

impl Aabb {
    /// Corners are re-ordered per axis so that `min <= max` always holds.
    #[inline]
    pub fn from_min_max(min: &Point3, max: &Point3) -> Self {
        Self {
            extents: [min.inf(max), min.sup(max)],
        }
    }

    #[inline]
    pub fn min(&self) -> Point3 {
        self.extents[0]
    }

    #[inline]
    pub fn max(&self) -> Point3 {
        self.extents[1]
    }

    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.max() - self.min()
    }

    /// Slab test against `[tmin, tmax]`. Returns the clipped parametric
    /// interval the ray spends inside the box.
    pub fn hit(&self, ray: &Ray, tmin: f32, tmax: f32) -> Option<(f32, f32)> {
        // Implementation based on PBRT.
        let mut t0 = tmin;
        let mut t1 = tmax;
        for axis in 0..3 {
            let inv_dir = 1.0 / ray.dir[axis];
            let mut t_near = (self.min()[axis] - ray.origin[axis]) * inv_dir;
            let mut t_far = (self.max()[axis] - ray.origin[axis]) * inv_dir;
            if t_near > t_far {
                std::mem::swap(&mut t_near, &mut t_far);
            }

            // Parallel rays produce NaN when the origin sits on a slab plane.
            if t_near.is_nan() || t_far.is_nan() {
                if ray.origin[axis] < self.min()[axis] || ray.origin[axis] > self.max()[axis] {
                    return None;
                }
                continue;
            }

            // Ensures robust bounds intersection.
            t_far *= 1.0 + 2.0 * gamma(3.0);

            t0 = t0.max(t_near);
            t1 = t1.min(t_far);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }
}

#[inline]
fn gamma(n: f32) -> f32 {
    const MACHINE_EPSILON: f32 = f32::EPSILON * 0.5;
    (n * MACHINE_EPSILON) / (1.0 - n * MACHINE_EPSILON)
}

//
// Tests
//
