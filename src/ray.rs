use super::*;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3,
    pub dir: Normal,
}

impl Ray {
    /// Fails when `dir` is (numerically) the zero vector.
    #[allow(dead_code)]
    pub fn new(origin: Point3, dir: Vec3) -> Result<Self> {
        let dir = na::Unit::try_new(dir, f32::EPSILON)
            .ok_or_else(|| anyhow!("Ray direction must be non-zero, got {dir:?}"))?;
        Ok(Self { origin, dir })
    }

    #[inline]
    pub fn at(&self, t: f32) -> Point3 {
        self.origin + t * self.dir.into_inner()
    }

    #[inline]
    pub fn translated(&self, offset: &Vec3) -> Self {
        Self {
            origin: self.origin + offset,
            dir: self.dir,
        }
    }
}

//
// Tests
//
