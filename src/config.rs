use super::*;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub grid: GridConfig,
    pub sensor: SensorConfig,
    pub camera: CameraConfig,
    pub fusion: FusionConfig,
    pub repair: RepairParams,
    pub render: RenderConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sensor.min_depth < self.sensor.max_depth,
            "Sensor depth range {}..{} is empty",
            self.sensor.min_depth,
            self.sensor.max_depth
        );
        ensure!(self.sensor.buffer_count >= 2, "Need at least 2 frame buffers");
        ensure!(
            (1..=2).contains(&self.sensor.cameras),
            "Only 1 or 2 source cameras are supported, got {}",
            self.sensor.cameras
        );
        ensure!(
            self.render.source < self.sensor.cameras,
            "Preview source {} does not exist",
            self.render.source
        );
        ensure!(self.render.samples > 0, "Render needs at least 1 sample");
        ensure!(
            self.sensor.target_fps > 0.0 && self.render.target_fps > 0.0,
            "Target frame rates must be positive"
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    pub length: usize,
    /// World units per cell, same on every axis.
    pub scale: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            length: 128,
            scale: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SensorConfig {
    pub width: u32,
    pub height: u32,
    pub min_depth: u16,
    pub max_depth: u16,
    pub target_fps: f32,
    pub buffer_count: usize,
    pub cameras: usize,
    /// Fraction of depth samples the synthetic sensor drops.
    pub dropout_rate: f32,
    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            min_depth: 500,
            max_depth: 1000,
            target_fps: 30.0,
            buffer_count: 3,
            cameras: 2,
            dropout_rate: 0.05,
            seed: 0x5eed,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub fusion_fov_deg: f32,
    pub depth_cutoff: f32,
    /// View camera distance from the grid center, in multiples of the grid's
    /// half length.
    pub distance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 70.0,
            fusion_fov_deg: 90.0,
            depth_cutoff: 1000.0,
            distance: 3.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FusionConfig {
    /// World distance covered by normalized depth `0..1`.
    pub depth_range: f32,
    pub parallax_max_offset: f32,
    pub parallax_base_offset: f32,
    pub lateral_offset: f32,
    pub extra_thickness: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            depth_range: 128.0,
            parallax_max_offset: 0.0,
            parallax_base_offset: 0.0,
            lateral_offset: 0.0,
            extra_thickness: 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RepairParams {
    pub enabled: bool,
    pub max_radius: u32,
    pub early_stop: u32,
    pub passes: u32,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            enabled: true,
            max_radius: 4,
            early_stop: 2,
            passes: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    #[default]
    Voxels,
    Color,
    Depth,
}

impl RenderMode {
    pub fn name(self) -> &'static str {
        match self {
            RenderMode::Voxels => "Voxels",
            RenderMode::Color => "Color",
            RenderMode::Depth => "Depth",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub mode: RenderMode,
    pub tonemap: Tonemap,
    pub occupancy: OccupancyPolicy,
    /// Surface cells accumulated per output pixel.
    pub samples: usize,
    /// Keep fusing into the previous volume instead of clearing it.
    pub freeze: bool,
    pub target_fps: f32,
    /// Source camera shown by the color and depth previews.
    pub source: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            mode: RenderMode::default(),
            tonemap: Tonemap::default(),
            occupancy: OccupancyPolicy::default(),
            samples: 1,
            freeze: false,
            target_fps: 30.0,
            source: 0,
        }
    }
}

//
// Serialization
//

pub fn read_from_file<P, T>(path: P) -> Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    from_reader(BufReader::new(file)).with_context(|| format!("Parsing {}", path.display()))
}

pub fn from_reader<R, T>(reader: R) -> Result<T>
where
    R: std::io::Read,
    T: DeserializeOwned,
{
    Ok(ron::de::from_reader(reader)?)
}

pub fn write_to_file<P, T>(path: P, value: &T) -> Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    to_writer(BufWriter::new(File::create(path)?), value)
}

pub fn to_writer<W, T>(writer: W, value: &T) -> Result<()>
where
    W: std::io::Write,
    T: Serialize,
{
    let ron_config = ron::ser::PrettyConfig::default();
    ron::ser::to_writer_pretty(writer, &value, ron_config)?;
    Ok(())
}

//
// Tests
//
