use super::*;

/// Baked-in exposure bias applied before either tonemapping curve.
const EXPOSURE_BIAS: f32 = 2.0;

/// Per-sample color accumulator, built while marching one output pixel and
/// consumed right away.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelHit {
    sum: ColorRgb,
    count: u32,
}

impl Default for VoxelHit {
    fn default() -> Self {
        Self {
            sum: ColorRgb::BLACK,
            count: 0,
        }
    }
}

impl VoxelHit {
    pub fn hit(&mut self, color: ColorRgb) {
        self.sum += color;
        self.count += 1;
    }

    #[allow(dead_code)]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean color scaled down by the exposure bias. Callers must check for at
    /// least one hit first.
    pub fn exposed(&self) -> ColorRgb {
        assert!(self.count > 0, "Exposing a VoxelHit with no hits");
        self.sum / (self.count as f32 * EXPOSURE_BIAS)
    }

    pub fn display_color(&self, tonemap: Tonemap) -> [u8; 3] {
        tonemap.apply(self.exposed()).into_rgb8()
    }
}

//
// Tests
//
