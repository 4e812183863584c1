use crate::Float;

use super::Vector3f;

// These operate on directions expressed in a local shading frame, where +z is the normal.

pub fn cos_theta(w: Vector3f) -> Float {
    w.z
}

pub fn abs_cos_theta(w: Vector3f) -> Float {
    Float::abs(w.z)
}

pub fn same_hemisphere(w: Vector3f, wp: Vector3f) -> bool {
    w.z * wp.z > 0.0
}
