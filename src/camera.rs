use super::*;

/// Perspective pinhole camera. Cameras are immutable snapshots: moving or
/// zooming produces a new `Camera`, so an in-flight render never sees one
/// change mid-frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    origin: Point3,
    look_at: Point3,
    up: Vec3,
    width: u32,
    height: u32,
    fov_deg: f32,
    depth_cutoff: f32,

    // Derived.
    forward: Normal,
    right: Normal,
    true_up: Normal,
    half_width: f32,
    half_height: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct CameraParams {
    pub origin: Point3,
    pub look_at: Point3,
    pub up: Vec3,
    pub image_size: (u32, u32),
    pub fov_deg: f32,
    pub depth_cutoff: f32,
}

impl Camera {
    pub fn new(params: &CameraParams) -> Result<Self> {
        let (width, height) = params.image_size;
        ensure!(width > 0 && height > 0, "Camera image size must be non-zero");
        ensure!(
            params.fov_deg > 0.0 && params.fov_deg < 180.0,
            "Camera field of view must be in (0, 180) degrees, got {}",
            params.fov_deg
        );
        ensure!(params.depth_cutoff > 0.0, "Camera depth cut-off must be positive");

        let forward = na::Unit::try_new(params.look_at - params.origin, f32::EPSILON)
            .ok_or_else(|| anyhow!("Camera origin and look-at point coincide"))?;
        let right = na::Unit::try_new(forward.cross(&params.up), f32::EPSILON)
            .ok_or_else(|| anyhow!("Camera up vector is parallel to the view direction"))?;
        let true_up = normal!(right.cross(&forward));

        let half_height = (0.5 * params.fov_deg.to_radians()).tan();
        let half_width = half_height * width as f32 / height as f32;

        Ok(Self {
            origin: params.origin,
            look_at: params.look_at,
            up: params.up,
            width,
            height,
            fov_deg: params.fov_deg,
            depth_cutoff: params.depth_cutoff,
            forward,
            right,
            true_up,
            half_width,
            half_height,
        })
    }

    fn params(&self) -> CameraParams {
        CameraParams {
            origin: self.origin,
            look_at: self.look_at,
            up: self.up,
            image_size: (self.width, self.height),
            fov_deg: self.fov_deg,
            depth_cutoff: self.depth_cutoff,
        }
    }

    /// Same camera translated by `translation`. Orientation is unchanged.
    #[must_use]
    pub fn with_offset(&self, translation: &Vec3) -> Self {
        Self {
            origin: self.origin + translation,
            look_at: self.look_at + translation,
            ..*self
        }
    }

    pub fn with_fov(&self, fov_deg: f32) -> Result<Self> {
        Self::new(&CameraParams {
            fov_deg,
            ..self.params()
        })
    }

    #[inline]
    pub fn origin(&self) -> Point3 {
        self.origin
    }

    #[inline]
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn depth_cutoff(&self) -> f32 {
        self.depth_cutoff
    }

    /// Ray from the camera origin through the center of pixel `(px, py)`.
    /// Pixel rows go top to bottom.
    pub fn ray_through_pixel(&self, px: u32, py: u32) -> Ray {
        // Normalize 0..size -> -1..1.
        let sx = 2.0 * (px as f32 + 0.5) / self.width as f32 - 1.0;
        let sy = 1.0 - 2.0 * (py as f32 + 0.5) / self.height as f32;

        let dir = self.forward.into_inner()
            + sx * self.half_width * self.right.into_inner()
            + sy * self.half_height * self.true_up.into_inner();
        Ray {
            origin: self.origin,
            dir: normal!(dir),
        }
    }
}

//
// Tests
//
