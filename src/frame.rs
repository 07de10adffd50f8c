use super::*;

/// Returned for color lookups that land outside the image.
pub const MISSING_COLOR: [u8; 4] = [255, 0, 255, 0];

/// Raw depth value the sensor uses for "no sample".
pub const MISSING_DEPTH: u16 = 0;

/// One captured RGB-D frame. Color is 4 bytes per pixel (R, G, B, A), depth
/// is one raw 16-bit sample per pixel, both row-major and aligned
/// pixel-for-pixel.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    min_depth: u16,
    max_depth: u16,
    color: Vec<u8>,
    depth: Vec<u16>,
    pub filtered: bool,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, min_depth: u16, max_depth: u16) -> Result<Self> {
        let pixel_count = width as usize * height as usize;
        Self::from_raw(
            width,
            height,
            min_depth,
            max_depth,
            vec![0; 4 * pixel_count],
            vec![MISSING_DEPTH; pixel_count],
        )
    }

    pub fn from_raw(
        width: u32,
        height: u32,
        min_depth: u16,
        max_depth: u16,
        color: Vec<u8>,
        depth: Vec<u16>,
    ) -> Result<Self> {
        ensure!(width > 0 && height > 0, "Frame size must be non-zero");
        let pixel_count = width as usize * height as usize;
        ensure!(
            color.len() == 4 * pixel_count,
            "Color plane has {} bytes, expected {}",
            color.len(),
            4 * pixel_count
        );
        ensure!(
            depth.len() == pixel_count,
            "Depth plane has {} samples, expected {pixel_count}",
            depth.len()
        );
        let mut frame = Self {
            width,
            height,
            min_depth: 0,
            max_depth: 0,
            color,
            depth,
            filtered: false,
        };
        frame.set_depth_range(min_depth, max_depth)?;
        Ok(frame)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn depth_range(&self) -> (u16, u16) {
        (self.min_depth, self.max_depth)
    }

    pub fn set_depth_range(&mut self, min_depth: u16, max_depth: u16) -> Result<()> {
        ensure!(
            min_depth < max_depth,
            "Invalid depth range {min_depth}..{max_depth}"
        );
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        Ok(())
    }

    pub fn color_plane_mut(&mut self) -> &mut [u8] {
        &mut self.color
    }

    #[allow(dead_code)]
    pub fn depth_plane(&self) -> &[u16] {
        &self.depth
    }

    pub fn depth_plane_mut(&mut self) -> &mut [u16] {
        &mut self.depth
    }

    //
    // Sampling
    //

    fn pixel_at(&self, u: f32, v: f32) -> (i64, i64) {
        let x = (u * self.width as f32).floor() as i64;
        let y = (v * self.height as f32).floor() as i64;
        (x, y)
    }

    fn index_of(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some((y * i64::from(self.width) + x) as usize)
    }

    pub fn color_pixel(&self, x: i64, y: i64) -> [u8; 4] {
        self.index_of(x, y).map_or(MISSING_COLOR, |index| {
            let offset = 4 * index;
            [
                self.color[offset],
                self.color[offset + 1],
                self.color[offset + 2],
                self.color[offset + 3],
            ]
        })
    }

    /// Nearest-pixel lookup for `u, v` in `[0, 1)`.
    pub fn color_at(&self, u: f32, v: f32) -> [u8; 4] {
        let (x, y) = self.pixel_at(u, v);
        self.color_pixel(x, y)
    }

    pub fn depth_pixel(&self, x: i64, y: i64) -> u16 {
        self.index_of(x, y)
            .map_or(MISSING_DEPTH, |index| self.depth[index])
    }

    /// Depth remapped from `[min_depth, max_depth]` to `[0, 1]`. Missing raw
    /// samples and samples outside the sensor range are `None`.
    pub fn depth_at(&self, u: f32, v: f32) -> Option<f32> {
        let (x, y) = self.pixel_at(u, v);
        let raw = self.depth_pixel(x, y);
        if raw == MISSING_DEPTH || raw < self.min_depth || raw > self.max_depth {
            return None;
        }
        Some(remap(
            f32::from(raw),
            (f32::from(self.min_depth), f32::from(self.max_depth)),
            (0.0, 1.0),
        ))
    }

    //
    // Depth repair
    //

    /// Fills a missing sample at `(x, y)` with the mean of the valid samples
    /// found scanning up to `max_radius` steps along +X, -X, +Y and -Y. Each
    /// direction stops after `early_stop` valid samples. Valid samples are
    /// returned unchanged.
    pub fn depth_repair(&self, x: i64, y: i64, max_radius: u32, early_stop: u32) -> Option<u16> {
        let depth = self.depth_pixel(x, y);
        if depth != MISSING_DEPTH {
            return Some(depth);
        }

        const DIRECTIONS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
        let mut sum = 0_u64;
        let mut count = 0_u64;
        for (dx, dy) in DIRECTIONS {
            let mut found = 0;
            for step in 1..=i64::from(max_radius) {
                if found >= early_stop {
                    break;
                }
                let sample = self.depth_pixel(x + dx * step, y + dy * step);
                if sample != MISSING_DEPTH {
                    sum += u64::from(sample);
                    count += 1;
                    found += 1;
                }
            }
        }

        if count == 0 {
            return None;
        }
        Some((sum / count) as u16)
    }

    /// Runs the repair filter over the whole depth plane, at most once per
    /// captured frame. Returns `false` if the frame was already filtered.
    pub fn repair_once(&mut self, params: &RepairParams) -> bool {
        if self.filtered {
            return false;
        }
        if params.enabled {
            for _ in 0..params.passes {
                self.repair_pass(params.max_radius, params.early_stop);
            }
        }
        self.filtered = true;
        true
    }

    fn repair_pass(&mut self, max_radius: u32, early_stop: u32) {
        let width = i64::from(self.width);
        let repaired = (0..self.depth.len())
            .into_par_iter()
            .map(|index| {
                let x = index as i64 % width;
                let y = index as i64 / width;
                self.depth_repair(x, y, max_radius, early_stop)
                    .unwrap_or(MISSING_DEPTH)
            })
            .collect::<Vec<_>>();
        self.depth = repaired;
    }
}

//
// Tests
//
