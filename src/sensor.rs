use super::*;

/// Procedural stand-in for an RGB-D device: a shaded ball drifting in front
/// of a checkered back wall, with a seeded fraction of depth samples dropped.
pub struct SyntheticSensor {
    width: u32,
    height: u32,
    min_depth: u16,
    max_depth: u16,
    dropout_rate: f32,
    /// Horizontal eye offset in pixels, applied to the whole scene.
    eye_offset: f32,
    frame_index: u64,
    rng: rand_pcg::Pcg64Mcg,
    uniform_01: rand::distributions::Uniform<f32>,
}

const WALL_DEPTH: f32 = 0.9;
const BALL_NEAR_DEPTH: f32 = 0.25;
const BALL_FAR_DEPTH: f32 = 0.45;
const CHECKER_SIZE: u32 = 8;
const DRIFT_SPEED: f32 = 0.05;

impl SyntheticSensor {
    pub fn new(config: &SensorConfig, side: CameraSide) -> Self {
        let (eye_offset, seed_offset) = match side {
            CameraSide::Left => (2.0, 0),
            CameraSide::Right => (-2.0, 1),
        };
        Self {
            width: config.width,
            height: config.height,
            min_depth: config.min_depth,
            max_depth: config.max_depth,
            dropout_rate: config.dropout_rate.clamp(0.0, 1.0),
            eye_offset,
            frame_index: 0,
            rng: rand_pcg::Pcg64Mcg::seed_from_u64(config.seed.wrapping_add(seed_offset)),
            uniform_01: rand::distributions::Uniform::new(0.0, 1.0),
        }
    }

    fn ball(&self) -> (Vec2, f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        let phase = DRIFT_SPEED * self.frame_index as f32;
        let center = vector![0.5 * w + 0.25 * w * phase.sin() + self.eye_offset, 0.5 * h];
        (center, 0.3 * h)
    }

    /// Normalized depth and color of the scene at pixel `(x, y)`.
    fn shade(&self, x: u32, y: u32, ball: &(Vec2, f32)) -> (f32, [u8; 4]) {
        let (center, radius) = ball;
        let offset = vector![x as f32 + 0.5, y as f32 + 0.5] - center;
        let r2 = offset.norm_squared() / (radius * radius);
        if r2 < 1.0 {
            let bulge = (1.0 - r2).sqrt();
            let depth = lerp_scalar(BALL_FAR_DEPTH, BALL_NEAR_DEPTH, bulge);
            let light = (64.0 + 191.0 * bulge) as u8;
            (depth, [light, light / 4, light / 8, 255])
        } else {
            let checker = (x / CHECKER_SIZE + y / CHECKER_SIZE) % 2 == 0;
            let gray = if checker { 200 } else { 90 };
            (WALL_DEPTH, [gray, gray, gray, 255])
        }
    }
}

impl FrameSource for SyntheticSensor {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self, frame: &mut FrameBuffer) -> Result<()> {
        ensure!(
            (frame.width(), frame.height()) == self.size(),
            "Frame is {}x{}, sensor produces {}x{}",
            frame.width(),
            frame.height(),
            self.width,
            self.height
        );

        let ball = self.ball();
        let (min_depth, max_depth) = (f32::from(self.min_depth), f32::from(self.max_depth));
        for y in 0..self.height {
            for x in 0..self.width {
                let index = y as usize * self.width as usize + x as usize;
                let (depth, color) = self.shade(x, y, &ball);
                let dropped = self.uniform_01.sample(&mut self.rng) < self.dropout_rate;
                frame.depth_plane_mut()[index] = if dropped {
                    MISSING_DEPTH
                } else {
                    lerp_scalar(min_depth, max_depth, depth).round() as u16
                };
                frame.color_plane_mut()[4 * index..4 * index + 4].copy_from_slice(&color);
            }
        }
        self.frame_index += 1;
        Ok(())
    }
}

//
// Tests
//
