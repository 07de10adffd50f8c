use super::*;

//
// Linear algebra
//

pub use na::vector;

pub type Vec2 = na::Vector2<f32>;
pub type Vec3 = na::Vector3<f32>;
pub type Vec3i = na::Vector3<i32>;
pub type Vec3u = na::Vector3<usize>;

pub type Point3 = na::Point3<f32>;

pub type Normal = na::UnitVector3<f32>;

#[macro_export]
macro_rules! normal {
    ($v:expr) => {
        na::Unit::new_normalize($v)
    };

    ($x:expr, $y:expr, $z:expr) => {
        na::Unit::new_normalize(na::Vector3::<f32>::new($x, $y, $z))
    };
}

//
// Scalar
//

pub fn remap(value: f32, from: (f32, f32), to: (f32, f32)) -> f32 {
    to.0 + (value - from.0) * (to.1 - to.0) / (from.1 - from.0)
}

pub fn lerp_scalar(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

//
// Tests
//
