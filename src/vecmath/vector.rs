use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use bytemuck::{Pod, Zeroable};

use super::{HasNan, Normal3f, NORMALIZED_TOLERANCE};
use crate::Float;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vector3f {
    pub x: Float,
    pub y: Float,
    pub z: Float,
}

impl Vector3f {
    /// All zeroes.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// A unit-length vector pointing along the positive X axis.
    pub const X: Self = Self {
        x: 1.0,
        y: 0.0,
        z: 0.0,
    };

    /// A unit-length vector pointing along the positive Y axis.
    pub const Y: Self = Self {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    /// A unit-length vector pointing along the positive Z axis.
    pub const Z: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    #[inline(always)]
    pub const fn new(x: Float, y: Float, z: Float) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, v: &Vector3f) -> Float {
        self.x * v.x + self.y * v.y + self.z * v.z
    }

    pub fn dot_normal(&self, n: &Normal3f) -> Float {
        self.x * n.x + self.y * n.y + self.z * n.z
    }

    pub fn abs_dot_normal(&self, n: &Normal3f) -> Float {
        Float::abs(self.dot_normal(n))
    }

    pub fn cross(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(
            self.y * v.z - self.z * v.y,
            self.z * v.x - self.x * v.z,
            self.x * v.y - self.y * v.x,
        )
    }

    pub fn length_squared(&self) -> Float {
        self.dot(self)
    }

    pub fn length(&self) -> Float {
        Float::sqrt(self.length_squared())
    }

    pub fn normalize(self) -> Vector3f {
        debug_assert!(!self.has_nan());
        self / self.length()
    }

    /// Normalizes the vector, or returns None if it has zero or non-finite length.
    pub fn try_normalize(self) -> Option<Vector3f> {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Some(self / len)
        } else {
            None
        }
    }

    pub fn is_normalized(&self) -> bool {
        Float::abs(self.length_squared() - 1.0) < NORMALIZED_TOLERANCE
    }

    pub fn max_component_value(&self) -> Float {
        Float::max(self.x, Float::max(self.y, self.z))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Builds two vectors that together with this one (which must be normalized)
    /// form an orthonormal basis.
    /// Duff et al., "Building an Orthonormal Basis, Revisited"; see PBRTv4 3.3.3.
    pub fn coordinate_system(&self) -> (Vector3f, Vector3f) {
        let sign = Float::copysign(1.0, self.z);
        let a = -1.0 / (sign + self.z);
        let b = self.x * self.y * a;
        (
            Vector3f::new(1.0 + sign * self.x * self.x * a, sign * b, -sign * self.x),
            Vector3f::new(b, sign + self.y * self.y * a, -self.y),
        )
    }
}

impl HasNan for Vector3f {
    fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }
}

impl From<Normal3f> for Vector3f {
    fn from(n: Normal3f) -> Self {
        Vector3f::new(n.x, n.y, n.z)
    }
}

impl From<[Float; 3]> for Vector3f {
    fn from(v: [Float; 3]) -> Self {
        Vector3f::new(v[0], v[1], v[2])
    }
}

impl_op_ex!(-|v: &Vector3f| -> Vector3f { Vector3f::new(-v.x, -v.y, -v.z) });
impl_op_ex!(+|a: &Vector3f, b: &Vector3f| -> Vector3f {
    Vector3f::new(a.x + b.x, a.y + b.y, a.z + b.z)
});
impl_op_ex!(-|a: &Vector3f, b: &Vector3f| -> Vector3f {
    Vector3f::new(a.x - b.x, a.y - b.y, a.z - b.z)
});
impl_op_ex_commutative!(*|v: &Vector3f, s: Float| -> Vector3f {
    Vector3f::new(v.x * s, v.y * s, v.z * s)
});
impl_op_ex!(/|v: &Vector3f, s: Float| -> Vector3f {
    debug_assert!(s != 0.0);
    let inv = 1.0 / s;
    Vector3f::new(v.x * inv, v.y * inv, v.z * inv)
});
impl_op_ex!(+=|a: &mut Vector3f, b: &Vector3f| {
    a.x += b.x;
    a.y += b.y;
    a.z += b.z;
});
impl_op_ex!(-=|a: &mut Vector3f, b: &Vector3f| {
    a.x -= b.x;
    a.y -= b.y;
    a.z -= b.z;
});
impl_op_ex!(*=|v: &mut Vector3f, s: Float| {
    v.x *= s;
    v.y *= s;
    v.z *= s;
});
