use super::*;

const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Captures, fuses and renders continuously, logging the frame rate.
    Live(LiveArgs),
    /// Renders a single fused frame and saves it.
    Snapshot(SnapshotArgs),
    /// Renders a photo set while sliding the view camera along X.
    Sweep(SweepArgs),
    /// Writes the effective configuration as ron.
    DumpConfig(DumpConfigArgs),
}

pub fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Live(args) => args.run(&config),
        Commands::Snapshot(args) => args.run(&config),
        Commands::Sweep(args) => args.run(&config),
        Commands::DumpConfig(args) => args.run(&config),
    }
}

fn start_rig(config: &Config) -> Result<CaptureRig> {
    let sources = (0..config.sensor.cameras)
        .map(|index| {
            let sensor = SyntheticSensor::new(&config.sensor, CameraSide::from_index(index));
            Box::new(sensor) as Box<dyn FrameSource>
        })
        .collect();
    let rig = CaptureRig::start(sources, &config.sensor)?;
    rig.wait_first_frames(FIRST_FRAME_TIMEOUT)?;
    Ok(rig)
}

//
// Live
//

#[derive(clap::Args)]
pub struct LiveArgs {
    /// Stop after this many frames. Runs until killed when omitted.
    #[arg(long)]
    frames: Option<u64>,

    /// Save the last rendered frame here on exit.
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Overrides the sensor depth range once capture is running.
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    depth_range: Option<Vec<u16>>,
}

impl LiveArgs {
    fn run(self, config: &Config) -> Result<()> {
        let rig = start_rig(config)?;
        if let Some(range) = &self.depth_range {
            rig.set_depth_range(range[0], range[1])?;
            info!("Depth range set to {}..{}", range[0], range[1]);
        }
        let mut renderer = Renderer::new(config)?;
        info!(
            "Rendering {} at {}x{}, {}",
            config.render.mode, config.render.width, config.render.height, config.render.tonemap
        );

        let period = Duration::from_secs_f32(config.render.target_fps.recip());
        let mut timing = Timing::new();
        let mut current_time = Instant::now();
        let mut frame_count = 0_u64;
        while self.frames.map_or(true, |frames| frame_count < frames) {
            let start = Instant::now();
            {
                let mut frames = rig.acquire_all()?;
                renderer.render_frame(&mut frames)?;
            }
            frame_count += 1;

            // Update clock.
            let delta_time = current_time.elapsed().as_secs_f32();
            current_time = Instant::now();
            if timing.push(delta_time) {
                info!(
                    "{}, voxels: {}",
                    timing.display_text(),
                    renderer.grid().occupied_count()
                );
                for (index, stats) in rig.stats().iter().enumerate() {
                    debug!("Source {index}: {}", stats.summary());
                }
            }

            // Sleep for the rest of the period.
            if let Some(rest) = period.checked_sub(start.elapsed()) {
                thread::sleep(rest);
            }
        }

        if let Some(path) = &self.screenshot {
            save_image(renderer.output(), path)?;
        }
        rig.stop(STOP_TIMEOUT)
    }
}

//
// Snapshot
//

#[derive(clap::Args)]
pub struct SnapshotArgs {
    #[arg(long)]
    output: PathBuf,

    /// Overrides the grid cell size.
    #[arg(long)]
    scale: Option<f32>,

    /// Overrides the view camera field of view, in degrees.
    #[arg(long)]
    fov: Option<f32>,
}

impl SnapshotArgs {
    fn run(self, config: &Config) -> Result<()> {
        let mut renderer = Renderer::new(config)?;
        if let Some(scale) = self.scale {
            renderer.set_scale(Vec3::repeat(scale))?;
        }
        if let Some(fov_deg) = self.fov {
            let view = renderer.view().with_fov(fov_deg)?;
            renderer.set_view(view)?;
        }

        let rig = start_rig(config)?;
        {
            let mut frames = rig.acquire_all()?;
            renderer.render_frame(&mut frames)?;
        }
        rig.stop(STOP_TIMEOUT)?;
        save_image(renderer.output(), &self.output)
    }
}

//
// Sweep
//

#[derive(clap::Args)]
pub struct SweepArgs {
    #[arg(long)]
    output_dir: PathBuf,

    #[arg(long, default_value_t = 8)]
    frames: u32,

    /// Camera translation between consecutive frames, in world units.
    #[arg(long, default_value_t = 4.0)]
    step: f32,
}

impl SweepArgs {
    /// X offset of frame `index`. The camera starts at `+frames * step / 2`
    /// and takes one step towards -X before every frame, so the last frame
    /// sits at `-frames * step / 2`.
    fn offset(&self, index: u32) -> f32 {
        0.5 * self.frames as f32 * self.step - (index + 1) as f32 * self.step
    }

    fn run(self, config: &Config) -> Result<()> {
        ensure!(self.frames > 0, "Sweep needs at least one frame");
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Creating {}", self.output_dir.display()))?;

        // Every image shows the same captured frames.
        let rig = start_rig(config)?;
        let mut frames = rig
            .acquire_all()?
            .iter()
            .map(|frame| (**frame).clone())
            .collect::<Vec<_>>();
        rig.stop(STOP_TIMEOUT)?;

        let mut renderer = Renderer::new(config)?;
        let base = *renderer.view();
        let digits = self.frames.to_string().len();
        for index in 0..self.frames {
            let view = base.with_offset(&vector![self.offset(index), 0.0, 0.0]);
            debug!("Frame {index}: camera at {}", view.origin());
            renderer.set_view(view)?;
            let mut frame_refs = frames.iter_mut().collect::<Vec<_>>();
            renderer.render_frame(&mut frame_refs)?;
            renderer.set_freeze(true);
            let path = self.output_dir.join(format!("{index:0digits$}.png"));
            save_image(renderer.output(), &path)?;
        }
        info!(
            "Saved {} frames to {}",
            self.frames,
            self.output_dir.display()
        );
        Ok(())
    }
}

//
// Dump config
//

#[derive(clap::Args)]
pub struct DumpConfigArgs {
    /// Writes to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl DumpConfigArgs {
    fn run(self, config: &Config) -> Result<()> {
        match &self.output {
            Some(path) => config::write_to_file(path, config),
            None => {
                config::to_writer(std::io::stdout().lock(), config)?;
                println!();
                Ok(())
            }
        }
    }
}

//
// Tests
//
