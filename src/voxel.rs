use super::*;

const OCCUPIED: u8 = 0b1000_0000;
const SEEN_BY_LEFT: u8 = 0b0100_0000;
const SEEN_BY_RIGHT: u8 = 0b0010_0000;

/// Packed voxel: three color bytes plus a state byte. The all-zero value is
/// the empty voxel.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Voxel {
    rgb: [u8; 3],
    state: u8,
}

impl Voxel {
    pub const EMPTY: Self = Self {
        rgb: [0, 0, 0],
        state: 0,
    };

    /// An occupied voxel seen by `side`.
    pub fn fused(rgb: [u8; 3], side: CameraSide) -> Self {
        Self {
            rgb,
            state: OCCUPIED | side.bit(),
        }
    }

    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        bytemuck::cast(bits)
    }

    #[inline]
    pub fn to_bits(self) -> u32 {
        bytemuck::cast(self)
    }

    #[inline]
    pub fn is_occupied(self) -> bool {
        self.state & OCCUPIED != 0
    }

    #[inline]
    pub fn seen_by(self, side: CameraSide) -> bool {
        self.state & side.bit() != 0
    }

    /// `None` for empty voxels, their color bytes are stale.
    #[inline]
    pub fn rgb(self) -> Option<[u8; 3]> {
        self.is_occupied().then_some(self.rgb)
    }

    pub fn color(self) -> Option<ColorRgb> {
        self.rgb().map(ColorRgb::from_rgb8)
    }

    pub fn is_surface(self, policy: OccupancyPolicy) -> bool {
        match policy {
            OccupancyPolicy::AnyCamera => self.is_occupied(),
            OccupancyPolicy::BothCameras => {
                self.is_occupied()
                    && self.seen_by(CameraSide::Left)
                    && self.seen_by(CameraSide::Right)
            }
        }
    }

    /// Takes the color of `other` and the union of both provenance bits.
    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        if !other.is_occupied() {
            return self;
        }
        let provenance = if self.is_occupied() {
            self.state & (SEEN_BY_LEFT | SEEN_BY_RIGHT)
        } else {
            0
        };
        Self {
            rgb: other.rgb,
            state: other.state | provenance,
        }
    }
}

impl std::fmt::Debug for Voxel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voxel")
            .field("rgb", &self.rgb)
            .field("occupied", &self.is_occupied())
            .field("left", &self.seen_by(CameraSide::Left))
            .field("right", &self.seen_by(CameraSide::Right))
            .finish()
    }
}

//
// Provenance
//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraSide {
    Left,
    Right,
}

impl CameraSide {
    const fn bit(self) -> u8 {
        match self {
            CameraSide::Left => SEEN_BY_LEFT,
            CameraSide::Right => SEEN_BY_RIGHT,
        }
    }

    /// Source index 0 is the left camera, everything else is the right one.
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            CameraSide::Left
        } else {
            CameraSide::Right
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OccupancyPolicy {
    #[default]
    AnyCamera,
    BothCameras,
}

//
// Tests
//
