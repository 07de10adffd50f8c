use super::*;

/// Minimum ray parameter for render rays, keeps cells behind the camera out.
const RENDER_TMIN: f32 = 1e-5;

/// Per-frame driver: clear, repair, fuse every source into the volume, then
/// ray march the volume into the output image.
pub struct Renderer {
    grid: VoxelGrid,
    view: Camera,
    fusion: Camera,
    fusion_params: FusionConfig,
    repair: RepairParams,
    render: RenderConfig,
    output: PixelBuffer,
}

impl Renderer {
    pub fn new(config: &Config) -> Result<Self> {
        let grid = VoxelGrid::new(
            config.grid.width,
            config.grid.height,
            config.grid.length,
            Vec3::repeat(config.grid.scale),
        )?;
        debug!("Grid world size: {}", grid.aabb().extents());

        // Sensors sit on the grid's front face looking into it, the view
        // camera further out on the same axis.
        let front = grid.aabb().max().z;
        let fusion = Camera::new(&CameraParams {
            origin: Point3::new(0.0, 0.0, front),
            look_at: Point3::new(0.0, 0.0, front - 1.0),
            up: vector![0.0, 1.0, 0.0],
            image_size: (config.sensor.width, config.sensor.height),
            fov_deg: config.camera.fusion_fov_deg,
            depth_cutoff: config.camera.depth_cutoff,
        })
        .context("Creating fusion camera")?;
        let view = Camera::new(&CameraParams {
            origin: Point3::new(0.0, 0.0, front * config.camera.distance),
            look_at: Point3::origin(),
            up: vector![0.0, 1.0, 0.0],
            image_size: (config.render.width, config.render.height),
            fov_deg: config.camera.fov_deg,
            depth_cutoff: config.camera.depth_cutoff,
        })
        .context("Creating view camera")?;

        let output = PixelBuffer::new(config.render.width, config.render.height)?;
        Ok(Self {
            grid,
            view,
            fusion,
            fusion_params: config.fusion.clone(),
            repair: config.repair.clone(),
            render: config.render.clone(),
            output,
        })
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn output(&self) -> &PixelBuffer {
        &self.output
    }

    pub fn view(&self) -> &Camera {
        &self.view
    }

    /// Swaps in a moved or zoomed camera. Takes effect on the next frame.
    pub fn set_view(&mut self, view: Camera) -> Result<()> {
        ensure!(
            view.image_size() == self.output.size(),
            "View camera size {:?} does not match output size {:?}",
            view.image_size(),
            self.output.size()
        );
        self.view = view;
        Ok(())
    }

    pub fn set_scale(&mut self, scale: Vec3) -> Result<()> {
        self.grid.set_scale(scale)
    }

    /// While frozen the volume is not cleared between frames.
    pub fn set_freeze(&mut self, freeze: bool) {
        self.render.freeze = freeze;
    }

    /// Renders one output image from the latest frame of every source.
    /// Source 0 is the left camera.
    pub fn render_frame<F>(&mut self, frames: &mut [F]) -> Result<()>
    where
        F: DerefMut<Target = FrameBuffer>,
    {
        ensure!(!frames.is_empty(), "Nothing to render without a frame");
        for frame in frames.iter_mut() {
            frame.repair_once(&self.repair);
        }
        match self.render.mode {
            RenderMode::Voxels => {
                if !self.render.freeze {
                    let timer = Instant::now();
                    self.grid.clear();
                    debug!("Clear took {:.03} ms", 1e3 * timer.elapsed().as_secs_f32());
                }
                for (index, frame) in frames.iter().enumerate() {
                    let timer = Instant::now();
                    let written = self.fuse(frame, CameraSide::from_index(index))?;
                    debug!(
                        "Fused source {index}: {written} cells in {:.03} ms",
                        1e3 * timer.elapsed().as_secs_f32()
                    );
                }
                self.render_voxels();
            }
            RenderMode::Color | RenderMode::Depth => {
                let source = self.render.source.min(frames.len() - 1);
                self.render_preview(&frames[source]);
            }
        }
        Ok(())
    }

    /// Fusion write pass for one source frame. Returns the number of cells
    /// written.
    fn fuse(&self, frame: &FrameBuffer, side: CameraSide) -> Result<usize> {
        let (width, height) = (frame.width(), frame.height());
        ensure!(
            (width, height) == self.fusion.image_size(),
            "Frame size {width}x{height} does not match fusion camera size {:?}",
            self.fusion.image_size()
        );

        let params = &self.fusion_params;
        let sign = match side {
            CameraSide::Left => -1.0,
            CameraSide::Right => 1.0,
        };
        let written = (0..width as usize * height as usize)
            .into_par_iter()
            .map(|index| {
                let x = (index % width as usize) as u32;
                let y = (index / width as usize) as u32;
                let u = (x as f32 + 0.5) / width as f32;
                let v = (y as f32 + 0.5) / height as f32;
                let Some(depth) = frame.depth_at(u, v).filter(|&depth| depth > 0.0) else {
                    return 0;
                };
                let start_distance = depth * params.depth_range;
                if start_distance >= self.fusion.depth_cutoff() {
                    return 0;
                }

                let parallax =
                    sign * (params.parallax_base_offset + params.parallax_max_offset * depth);
                let ray = self
                    .fusion
                    .with_offset(&vector![parallax, 0.0, 0.0])
                    .ray_through_pixel(x, y);
                let [r, g, b, _] = frame.color_at(u, v);
                self.grid.set_voxel(
                    &ray,
                    start_distance,
                    [r, g, b],
                    side,
                    params.lateral_offset,
                    params.extra_thickness,
                )
            })
            .sum::<usize>();
        Ok(written)
    }

    /// Render read pass, one parallel task per output row.
    fn render_voxels(&mut self) {
        let timer = Instant::now();
        let (grid, view, render) = (&self.grid, &self.view, &self.render);
        let (width, _) = self.output.size();
        self.output.rows_mut().for_each(|(y, row)| {
            for (x, rgb) in (0..width).zip(row.chunks_exact_mut(3)) {
                let ray = view.ray_through_pixel(x, y);
                let hit = grid.hit_accumulated(
                    &ray,
                    RENDER_TMIN,
                    view.depth_cutoff(),
                    render.occupancy,
                    render.samples,
                );
                let color = if hit.is_empty() {
                    [0; 3]
                } else {
                    hit.display_color(render.tonemap)
                };
                rgb.copy_from_slice(&color);
            }
        });
        debug!("Render took {:.03} ms", 1e3 * timer.elapsed().as_secs_f32());
    }

    /// Direct view of one source's color or depth plane, stretched to the
    /// output size.
    fn render_preview(&mut self, frame: &FrameBuffer) {
        let mode = self.render.mode;
        let depth_range = self.fusion_params.depth_range;
        let cutoff = self.fusion.depth_cutoff();
        let (width, height) = self.output.size();
        self.output.rows_mut().for_each(|(y, row)| {
            let v = (y as f32 + 0.5) / height as f32;
            for (x, rgb) in (0..width).zip(row.chunks_exact_mut(3)) {
                let u = (x as f32 + 0.5) / width as f32;
                let color = if mode == RenderMode::Depth {
                    depth_preview(frame.depth_at(u, v), depth_range, cutoff)
                } else {
                    let [r, g, b, _] = frame.color_at(u, v);
                    [r, g, b]
                };
                rgb.copy_from_slice(&color);
            }
        });
    }
}

/// Gray normalized depth. Missing samples render black, samples at or past
/// the cut-off lose red.
fn depth_preview(depth: Option<f32>, depth_range: f32, cutoff: f32) -> [u8; 3] {
    let Some(depth) = depth.filter(|&depth| depth > 0.0) else {
        return [0; 3];
    };
    let value = (depth * 255.0).clamp(0.0, 255.0) as u8;
    if depth * depth_range >= cutoff {
        [0, value, value]
    } else {
        [value, value, value]
    }
}

//
// Tests
//
