use std::ops;

use super::*;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorRgb([f32; 3]);

impl ColorRgb {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self([r, g, b])
    }

    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self(rgb.map(|channel| f32::from(channel) / 255.0))
    }

    #[allow(dead_code)]
    pub const fn r(&self) -> f32 {
        self.0[0]
    }

    #[allow(dead_code)]
    pub const fn g(&self) -> f32 {
        self.0[1]
    }

    #[allow(dead_code)]
    pub const fn b(&self) -> f32 {
        self.0[2]
    }

    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self(self.0.map(f))
    }

    /// Scales `0..1` to `0..255`, clamping anything outside.
    pub fn into_rgb8(self) -> [u8; 3] {
        self.0.map(|x| (x * 255.0).clamp(0.0, 255.0) as u8)
    }
}

impl ops::AddAssign for ColorRgb {
    fn add_assign(&mut self, rhs: Self) {
        for (channel, other) in self.0.iter_mut().zip(rhs.0) {
            *channel += other;
        }
    }
}

impl ops::Div<f32> for ColorRgb {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        self.map(|channel| channel / rhs)
    }
}

//
// Tonemapping
//

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tonemap {
    #[default]
    Reinhard,
    Aces,
}

impl Tonemap {
    pub fn apply(self, color: ColorRgb) -> ColorRgb {
        match self {
            Tonemap::Reinhard => color.map(reinhard),
            Tonemap::Aces => color.map(aces),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tonemap::Reinhard => "Reinhard",
            Tonemap::Aces => "ACES",
        }
    }
}

impl fmt::Display for Tonemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn reinhard(x: f32) -> f32 {
    x / (1.0 + x)
}

fn aces(x: f32) -> f32 {
    // https://knarkowicz.wordpress.com/2016/01/06/aces-filmic-tone-mapping-curve/
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    f32::clamp((x * (a * x + b)) / (x * (c * x + d) + e), 0.0, 1.0)
}

//
// Tests
//
